use std::time::Instant;

use insight_core::{Message, Sender, Theme};
use ratatui::{
    layout::{Constraint, Layout, Margin, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
    Frame,
};

use crate::app::{App, InputMode};
use crate::chart_view::{render_chart_block, ChartBlock};
use crate::markdown::render_markdown;
use crate::theme::Palette;

/// Widest a chart is drawn, in columns.
const MAX_CHART_WIDTH: u16 = 100;
const MIN_CHAT_WIDTH: u16 = 30;

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();
    let palette = Palette::for_theme(app.theme);

    // Root style follows the active theme
    frame.render_widget(Block::default().style(palette.root()), area);

    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area, &palette);

    let sidebar_width = app
        .sidebar_columns()
        .min(body_area.width.saturating_sub(MIN_CHAT_WIDTH));
    let [sidebar_area, main_area] = Layout::horizontal([
        Constraint::Length(sidebar_width),
        Constraint::Min(0),
    ])
    .areas(body_area);

    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(main_area);

    // Store areas for mouse hit-testing
    app.sidebar_area = (sidebar_width > 0).then_some(sidebar_area);
    app.chat_area = Some(chat_area);

    if sidebar_width > 0 {
        render_sidebar(app, frame, sidebar_area, &palette);
    }
    render_messages(app, frame, chat_area, &palette);
    render_input(app, frame, input_area, &palette);
    render_footer(app, frame, footer_area, &palette);

    if let Some(alert) = &app.alert {
        render_alert(alert, frame, area, &palette);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let title = Line::from(vec![
        Span::styled(" Insight Chat ", palette.title()),
        Span::styled(
            format!("[{}] ", app.chat.agent_mode().display_name()),
            palette.subtitle(),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            palette.subtitle(),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(palette.surface));
    frame.render_widget(header, area);
}

fn render_sidebar(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let border = if app.sidebar.is_dragging() {
        palette.border_active()
    } else {
        palette.border()
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(Span::styled(" Session ", palette.title()));

    let label = |text: &str| Line::from(Span::styled(text.to_string(), palette.subtitle()));
    let value = |text: String, style: Style| Line::from(Span::styled(format!("  {}", text), style));
    let text_style = Style::default().fg(palette.text);

    let mut lines = vec![
        label("Agent mode"),
        value(
            app.chat.agent_mode().display_name().to_string(),
            text_style.add_modifier(Modifier::BOLD),
        ),
        Line::default(),
        label("Theme"),
        value(app.theme.as_str().to_string(), text_style),
        Line::default(),
        label("Attachment"),
    ];

    lines.push(match app.chat.uploaded_file() {
        None => value("none".to_string(), palette.subtitle()),
        Some(file) if file.loading => value(format!("{} (reading…)", file.name), palette.subtitle()),
        Some(file) => match &file.error {
            Some(err) => value(format!("{}: {}", file.name, err), palette.error()),
            None => value(
                format!(
                    "{} ({} chars)",
                    file.name,
                    file.content.as_deref().map(|c| c.chars().count()).unwrap_or(0)
                ),
                Style::default().fg(palette.success),
            ),
        },
    });

    let tokens = app.chat.total_tokens();
    lines.extend([
        Line::default(),
        label("Thread"),
        value(
            app.chat.thread_id().unwrap_or("new").to_string(),
            text_style,
        ),
        Line::default(),
        label("Tokens"),
        value(format!("{} in / {} out", tokens.input, tokens.output), text_style),
        Line::default(),
        label("Keys"),
        value("Ctrl+A  agent mode".to_string(), palette.subtitle()),
        value("Ctrl+T  theme".to_string(), palette.subtitle()),
        value("Ctrl+O  attach".to_string(), palette.subtitle()),
        value("Ctrl+X  detach".to_string(), palette.subtitle()),
        value("Drag border to resize".to_string(), palette.subtitle()),
    ]);

    let sidebar = Paragraph::new(lines)
        .block(block)
        .wrap(Wrap { trim: false });
    frame.render_widget(sidebar, area);
}

/// A vertically stacked piece of the message list.
enum Segment {
    Lines(Vec<Line<'static>>),
    Chart { block: ChartBlock, created: Instant },
}

impl Segment {
    fn height(&self) -> u16 {
        match self {
            Segment::Lines(lines) => u16::try_from(lines.len()).unwrap_or(u16::MAX),
            Segment::Chart { block, .. } => block.height(),
        }
    }
}

fn sender_line(msg: &Message, palette: &Palette) -> Line<'static> {
    let mut spans = match (msg.sender, msg.is_error) {
        (Sender::User, _) => vec![Span::styled(
            "▶ You",
            Style::default().fg(palette.user).add_modifier(Modifier::BOLD),
        )],
        (Sender::Agent, false) => vec![Span::styled(
            "◆ Agent",
            Style::default().fg(palette.agent).add_modifier(Modifier::BOLD),
        )],
        (Sender::Agent, true) => vec![Span::styled(
            "✖ Agent",
            palette.error().add_modifier(Modifier::BOLD),
        )],
    };
    if let Some(name) = &msg.file_name {
        let tag = match &msg.file_content {
            Some(content) => format!("  [file: {} · {} lines]", name, content.lines().count()),
            None => format!("  [file: {}]", name),
        };
        spans.push(Span::styled(tag, palette.subtitle()));
    }
    Line::from(spans)
}

fn message_segments(
    msg: &Message,
    width: usize,
    palette: &Palette,
    theme: Theme,
    show_details: bool,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut lines = vec![sender_line(msg, palette)];

    let base = if msg.is_error {
        palette.error()
    } else {
        Style::default().fg(palette.text)
    };
    if let Some(text) = msg.text.as_deref().filter(|t| !t.trim().is_empty()) {
        lines.extend(render_markdown(text, width, base, palette));
    }

    if let Some(payload) = &msg.chart_payload {
        segments.push(Segment::Lines(std::mem::take(&mut lines)));
        segments.push(Segment::Chart {
            block: ChartBlock::prepare(payload, theme),
            created: msg.timestamp,
        });
    }

    let mut notes = Vec::new();
    if let Some(thread_id) = &msg.thread_id {
        notes.push(format!("thread {}", thread_id));
    }
    if let Some(usage) = msg.token_usage {
        notes.push(format!("tokens {} in / {} out", usage.input, usage.output));
    }
    if !notes.is_empty() {
        lines.push(Line::from(Span::styled(notes.join(" · "), palette.subtitle())));
    }

    if msg.is_error {
        if let Some(details) = &msg.error_details {
            if show_details {
                let pretty = serde_json::to_string_pretty(details).unwrap_or_default();
                lines.push(Line::from(Span::styled("Error details:", palette.subtitle())));
                lines.extend(render_markdown(&format!("```\n{}\n```", pretty), width, base, palette));
            } else {
                lines.push(Line::from(Span::styled(
                    "Ctrl+E to show error details",
                    palette.subtitle().add_modifier(Modifier::ITALIC),
                )));
            }
        }
    }

    lines.push(Line::default());
    segments.push(Segment::Lines(lines));
    segments
}

fn loading_segment(app: &App, palette: &Palette) -> Segment {
    // Animated ellipsis: cycles through ".", "..", "..."
    let dots = ".".repeat((app.animation_frame as usize) + 1);
    Segment::Lines(vec![
        Line::from(Span::styled(
            "◆ Agent",
            Style::default().fg(palette.agent).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!("Thinking{}", dots),
            palette.subtitle().add_modifier(Modifier::ITALIC),
        )),
    ])
}

fn render_messages(app: &mut App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(palette.border())
        .title(Span::styled(" Chat ", palette.title()));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    app.view_height = inner.height;
    if app.chat.messages().is_empty() && !app.chat.is_loading() {
        app.content_height = 0;
        let placeholder = Paragraph::new(Text::from(Span::styled(
            "Ask a question about your data, or press Ctrl+O to attach a file.",
            palette.subtitle(),
        )))
        .wrap(Wrap { trim: true });
        frame.render_widget(placeholder, inner);
        return;
    }

    // Leave a column for the scrollbar
    let text_width = inner.width.saturating_sub(1).max(1) as usize;
    let mut segments: Vec<Segment> = app
        .chat
        .messages()
        .iter()
        .flat_map(|m| message_segments(m, text_width, palette, app.theme, app.show_error_details))
        .collect();
    if app.chat.is_loading() {
        segments.push(loading_segment(app, palette));
    }

    let total: u16 = segments.iter().map(Segment::height).fold(0u16, |a, h| a.saturating_add(h));
    app.content_height = total;
    app.scroll_back = app.scroll_back.min(total.saturating_sub(inner.height));

    // End-anchored window over the stacked segments
    let window_top = total.saturating_sub(inner.height).saturating_sub(app.scroll_back);
    let window_bottom = window_top.saturating_add(inner.height);
    let chart_width = (text_width as u16).min(MAX_CHART_WIDTH);

    let mut top = 0u16;
    for segment in &segments {
        let height = segment.height();
        let bottom = top.saturating_add(height);
        let visible_start = top.max(window_top);
        let visible_end = bottom.min(window_bottom);

        if visible_start < visible_end {
            let y = inner.y + (visible_start - window_top);
            let visible = visible_end - visible_start;
            match segment {
                Segment::Lines(lines) => {
                    let paragraph = Paragraph::new(lines.clone()).scroll((visible_start - top, 0));
                    frame.render_widget(paragraph, Rect::new(inner.x, y, text_width as u16, visible));
                }
                Segment::Chart { block, created } if visible == height => {
                    let rect = Rect::new(inner.x, y, chart_width, height);
                    render_chart_block(frame, rect, block, palette, *created);
                }
                Segment::Chart { .. } => {
                    let hint = Paragraph::new(Span::styled(
                        "▲ chart partly hidden (PageUp/PageDown to scroll)",
                        palette.subtitle().add_modifier(Modifier::ITALIC),
                    ));
                    frame.render_widget(hint, Rect::new(inner.x, y, text_width as u16, 1));
                }
            }
        }
        top = bottom;
    }

    if total > inner.height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));
        let mut scrollbar_state =
            ScrollbarState::new(total.saturating_sub(inner.height) as usize).position(window_top as usize);
        frame.render_stateful_widget(
            scrollbar,
            area.inner(Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let (editor, title, border) = match app.input_mode {
        InputMode::AttachPath => (
            &app.attach_input,
            " Attach file path (Enter to confirm, Esc to cancel) ",
            palette.border_active(),
        ),
        InputMode::Chat if app.chat.is_loading() => (
            &app.input,
            " Waiting for the agent… ",
            palette.border(),
        ),
        InputMode::Chat => (&app.input, " Message (Enter to send) ", palette.border_active()),
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(border)
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = editor.cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = editor
        .text
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(palette.user))
        .block(input_block);
    frame.render_widget(input, area);

    if app.alert.is_none() {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect, palette: &Palette) {
    let key_style = palette.key();
    let label_style = palette.label();

    let hints = match app.input_mode {
        InputMode::AttachPath => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" attach ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" cancel ", label_style),
        ],
        InputMode::Chat => {
            let mut hints = vec![
                Span::styled(" Enter ", key_style),
                Span::styled(" send ", label_style),
                Span::styled(" ^O ", key_style),
                Span::styled(" attach ", label_style),
            ];
            if app.chat.uploaded_file().is_some_and(|f| f.loading) {
                hints.extend([
                    Span::styled(" Esc ", key_style),
                    Span::styled(" cancel read ", label_style),
                ]);
            }
            hints.extend([
                Span::styled(" ^T ", key_style),
                Span::styled(" theme ", label_style),
                Span::styled(" ^A ", key_style),
                Span::styled(" mode ", label_style),
                Span::styled(" ^E ", key_style),
                Span::styled(" details ", label_style),
                Span::styled(" PgUp/PgDn ", key_style),
                Span::styled(" scroll ", label_style),
                Span::styled(" ^C ", key_style),
                Span::styled(" quit ", label_style),
            ]);
            hints
        }
    };

    let footer = Paragraph::new(Line::from(hints)).style(Style::default().bg(palette.surface));
    frame.render_widget(footer, area);
}

fn render_alert(message: &str, frame: &mut Frame, area: Rect, palette: &Palette) {
    // Calculate popup size and position (centered)
    let popup_width = 60.min(area.width.saturating_sub(4));
    let popup_height = 7.min(area.height);
    let popup_x = (area.width.saturating_sub(popup_width)) / 2;
    let popup_y = (area.height.saturating_sub(popup_height)) / 2;
    let popup_area = Rect::new(popup_x, popup_y, popup_width, popup_height);

    // Clear the area behind the popup
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(palette.error))
        .style(palette.root())
        .title(Span::styled(" Cannot attach file ", palette.error()));

    let text = vec![
        Line::from(Span::styled(message.to_string(), Style::default().fg(palette.text))),
        Line::default(),
        Line::from(Span::styled("Press Enter or Esc to dismiss", palette.subtitle())),
    ];
    let popup = Paragraph::new(text).block(block).wrap(Wrap { trim: true });
    frame.render_widget(popup, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use insight_core::{AskRequest, Backend, BackendError, Config, ThemeStore};
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};
    use serde_json::{json, Value};
    use tokio::sync::Notify;

    use crate::tui::PointerTracking;

    fn palette() -> Palette {
        Palette::for_theme(Theme::Dark)
    }

    /// Holds every reply until `release` is notified.
    struct HeldBackend {
        release: Arc<Notify>,
        reply: Option<Value>,
    }

    #[async_trait]
    impl Backend for HeldBackend {
        async fn ask(&self, request: &AskRequest) -> Result<Value, BackendError> {
            self.release.notified().await;
            Ok(self.reply.clone().unwrap_or_else(|| {
                json!({"response": format!("echo: {}", request.prompt), "thread_id": "t-1"})
            }))
        }
    }

    fn held_app(release: &Arc<Notify>, reply: Option<Value>) -> App {
        App::new(
            &Config::new(),
            Arc::new(HeldBackend {
                release: Arc::clone(release),
                reply,
            }),
            Box::new(NoStore),
            Theme::Dark,
            PointerTracking::default(),
        )
    }

    async fn settle(app: &mut App) {
        for _ in 0..100 {
            if app.query_task.is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            app.poll_tasks();
        }
        panic!("request did not finish");
    }

    struct NoStore;

    impl ThemeStore for NoStore {
        fn load(&self) -> Option<Theme> {
            None
        }

        fn save(&mut self, _theme: Theme) -> Result<(), insight_core::ConfigError> {
            Ok(())
        }
    }

    fn draw_frame(terminal: &mut Terminal<TestBackend>, app: &mut App) -> Buffer {
        app.sync_scroll();
        terminal.draw(|frame| render(app, frame)).unwrap();
        terminal.backend().buffer().clone()
    }

    /// Text of one row inside the chat panel's borders.
    fn chat_row(buffer: &Buffer, chat: Rect, y: u16) -> String {
        (chat.x + 1..chat.x + chat.width - 1)
            .map(|x| buffer.content[buffer.index_of(x, y)].symbol())
            .collect()
    }

    fn chat_rows(buffer: &Buffer, chat: Rect) -> Vec<String> {
        (chat.y + 1..chat.y + chat.height - 1)
            .map(|y| chat_row(buffer, chat, y))
            .collect()
    }

    #[tokio::test]
    async fn thinking_row_is_last_while_pending_and_gone_after_reply() {
        let release = Arc::new(Notify::new());
        let mut app = held_app(&release, None);
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();

        // Long enough to overflow the chat panel.
        app.input.text = "word ".repeat(200).trim_end().to_string();
        app.submit();
        assert!(app.chat.is_loading());

        let buffer = draw_frame(&mut terminal, &mut app);
        let chat = app.chat_area.unwrap();
        assert!(app.content_height > app.view_height);
        let rows = chat_rows(&buffer, chat);
        assert!(rows.last().unwrap().contains("Thinking"));
        assert!(rows[rows.len() - 2].contains("Agent"));

        // Scrolled back, the pending row leaves the window.
        app.scroll_back = 4;
        let buffer = draw_frame(&mut terminal, &mut app);
        assert_eq!(app.scroll_back, 4);
        assert!(!chat_rows(&buffer, chat).iter().any(|r| r.contains("Thinking")));

        release.notify_one();
        settle(&mut app).await;
        assert!(!app.chat.is_loading());

        let buffer = draw_frame(&mut terminal, &mut app);
        assert_eq!(app.scroll_back, 0);
        let rows = chat_rows(&buffer, chat);
        assert!(!rows.iter().any(|r| r.contains("Thinking")));
        // Thread note, then the blank spacer that closes every message.
        assert!(rows[rows.len() - 2].contains("thread t-1"));
        assert!(rows.last().unwrap().trim().is_empty());
    }

    #[tokio::test]
    async fn partly_visible_chart_is_replaced_by_hint() {
        let release = Arc::new(Notify::new());
        release.notify_one();
        let reply = json!({
            "response": "Totals",
            "graph_data": {"kind": "bar", "labels": ["a", "b"], "values": [1, 2]}
        });
        let mut app = held_app(&release, Some(reply));
        // The chat panel is shorter than a chart block.
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();

        app.input.text = "chart please".into();
        app.submit();
        settle(&mut app).await;
        assert!(app.chat.messages().last().unwrap().is_graph());

        let buffer = draw_frame(&mut terminal, &mut app);
        let rows = chat_rows(&buffer, app.chat_area.unwrap());
        assert!(rows[0].contains("chart partly hidden"));
        assert!(!rows.iter().any(|r| r.contains("failed to render")));
    }

    #[test]
    fn graph_message_splits_into_chart_segment() {
        let msg = Message::agent("Totals by region")
            .with_chart(json!({"kind": "bar", "labels": ["a"], "values": [1]}));
        let segments = message_segments(&msg, 40, &palette(), Theme::Dark, false);
        assert_eq!(segments.len(), 3);
        assert!(matches!(segments[1], Segment::Chart { .. }));
    }

    #[test]
    fn attached_file_tag_shows_line_count() {
        let file = insight_core::UploadedFile {
            name: "sales.csv".into(),
            content: Some("region,total\nwest,3\neast,4".into()),
            loading: false,
            error: None,
        };
        let line = sender_line(&Message::user("summarize", Some(&file)), &palette());
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert!(text.contains("[file: sales.csv · 3 lines]"));
    }

    #[test]
    fn error_details_hidden_until_toggled() {
        let msg = Message::agent_error("failed", Some(json!({"error": "boom"})));
        let collapsed = message_segments(&msg, 40, &palette(), Theme::Dark, false);
        let expanded = message_segments(&msg, 40, &palette(), Theme::Dark, true);
        assert!(expanded[0].height() > collapsed[0].height());
    }

    #[test]
    fn text_message_height_counts_wrapped_lines() {
        let msg = Message::agent("one two three four five six seven eight nine ten");
        let segments = message_segments(&msg, 10, &palette(), Theme::Dark, false);
        // header + wrapped body + spacer
        assert!(segments[0].height() >= 6);
    }
}
