//! Terminal styling derived from the active light/dark theme.
//!
//! Every widget takes its colors from a `Palette` built from the one theme
//! value held by `App`, so a toggle restyles the whole frame at once.

use insight_core::chart::Rgb;
use insight_core::Theme;
use ratatui::style::{Color, Modifier, Style};

pub fn to_color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub background: Color,
    pub surface: Color,
    pub text: Color,
    pub muted: Color,
    pub accent: Color,
    pub user: Color,
    pub agent: Color,
    pub error: Color,
    pub success: Color,
    pub border: Color,
    pub border_active: Color,
    pub code_bg: Color,
}

impl Palette {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                background: Color::Rgb(22, 27, 34),
                surface: Color::Rgb(33, 38, 45),
                text: Color::Rgb(230, 237, 243),
                muted: Color::Rgb(125, 133, 144),
                accent: Color::Rgb(100, 180, 220),
                user: Color::Rgb(100, 180, 220),
                agent: Color::Rgb(255, 200, 100),
                error: Color::Rgb(220, 100, 100),
                success: Color::Rgb(130, 200, 130),
                border: Color::Rgb(70, 75, 85),
                border_active: Color::Rgb(100, 180, 220),
                code_bg: Color::Rgb(45, 51, 59),
            },
            Theme::Light => Self {
                background: Color::Rgb(255, 255, 255),
                surface: Color::Rgb(246, 248, 250),
                text: Color::Rgb(33, 37, 41),
                muted: Color::Rgb(106, 115, 125),
                accent: Color::Rgb(9, 105, 218),
                user: Color::Rgb(9, 105, 218),
                agent: Color::Rgb(154, 103, 0),
                error: Color::Rgb(207, 34, 46),
                success: Color::Rgb(26, 127, 55),
                border: Color::Rgb(208, 215, 222),
                border_active: Color::Rgb(9, 105, 218),
                code_bg: Color::Rgb(234, 238, 242),
            },
        }
    }

    /// Root style applied to the whole frame.
    pub fn root(&self) -> Style {
        Style::default().bg(self.background).fg(self.text)
    }

    pub fn title(&self) -> Style {
        Style::default().fg(self.accent).add_modifier(Modifier::BOLD)
    }

    pub fn subtitle(&self) -> Style {
        Style::default().fg(self.muted)
    }

    pub fn border(&self) -> Style {
        Style::default().fg(self.border)
    }

    pub fn border_active(&self) -> Style {
        Style::default().fg(self.border_active)
    }

    pub fn code(&self) -> Style {
        Style::default().bg(self.code_bg).fg(self.text)
    }

    pub fn error(&self) -> Style {
        Style::default().fg(self.error)
    }

    /// Footer key hint, e.g. the `Enter` in "Enter send".
    pub fn key(&self) -> Style {
        Style::default().bg(self.border).fg(self.text)
    }

    pub fn label(&self) -> Style {
        Style::default().bg(self.surface).fg(self.text)
    }
}
