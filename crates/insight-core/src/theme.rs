//! Light/dark theme selection and persistence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" => Some(Theme::Light),
            "dark" => Some(Theme::Dark),
            _ => None,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Where the chosen theme is remembered between sessions.
pub trait ThemeStore {
    fn load(&self) -> Option<Theme>;
    fn save(&mut self, theme: Theme) -> Result<(), ConfigError>;
}

/// Stores the theme under the `theme` key of the JSON config file, leaving
/// the other keys untouched.
#[derive(Debug, Clone)]
pub struct ConfigThemeStore {
    path: PathBuf,
}

impl ConfigThemeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ThemeStore for ConfigThemeStore {
    fn load(&self) -> Option<Theme> {
        match Config::load_from(&self.path) {
            Ok(config) => config.theme,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not read stored theme");
                None
            }
        }
    }

    fn save(&mut self, theme: Theme) -> Result<(), ConfigError> {
        // An unreadable file is left alone rather than replaced by a theme-only one.
        let mut config = Config::load_from(&self.path)?;
        config.theme = Some(theme);
        config.save_to(&self.path)
    }
}

/// Theme preference reported by the terminal, if any.
pub fn system_theme() -> Option<Theme> {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|v| theme_from_colorfgbg(&v))
}

/// Parses `COLORFGBG` (`"fg;bg"` or `"fg;default;bg"`). Background indices
/// 7 and 9-15 are light ANSI colors; the rest are dark.
pub fn theme_from_colorfgbg(value: &str) -> Option<Theme> {
    let bg: u8 = value.rsplit(';').next()?.trim().parse().ok()?;
    match bg {
        7 | 9..=15 => Some(Theme::Light),
        0..=6 | 8 => Some(Theme::Dark),
        _ => None,
    }
}

/// Stored preference first, then the terminal's, then dark.
pub fn initial_theme(store: &dyn ThemeStore, system: Option<Theme>) -> Theme {
    store.load().or(system).unwrap_or_default()
}
