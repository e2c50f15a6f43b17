use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use insight_core::attachment::{check_selection, read_attachment};
use insight_core::{
    Backend, BackendError, ChatController, Config, ReadOutcome, ResizeController, Theme,
    ThemeStore,
};
use ratatui::layout::Rect;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::tui::PointerTracking;

/// Logical pixels per terminal column, for sidebar widths.
pub const PX_PER_COLUMN: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Chat,
    AttachPath,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line text input with a character cursor.
#[derive(Debug, Clone, Default)]
pub struct LineEditor {
    pub text: String,
    pub cursor: usize,
}

impl LineEditor {
    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.text, self.cursor);
        self.text.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let byte_pos = char_to_byte_index(&self.text, self.cursor);
            self.text.remove(byte_pos);
        }
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.len();
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation
    pub chat: ChatController,
    pub input: LineEditor,
    pub backend: Arc<dyn Backend>,
    pub query_task: Option<JoinHandle<Result<Value, BackendError>>>,

    // Attachment
    pub attach_input: LineEditor,
    pub attach_task: Option<(u64, JoinHandle<ReadOutcome>)>,

    // Appearance
    pub theme: Theme,
    theme_store: Box<dyn ThemeStore + Send>,
    pub sidebar: ResizeController<PointerTracking>,

    // Message list scrolling, in rows from the end
    pub scroll_back: u16,
    pub content_height: u16,
    pub view_height: u16,
    seen_revision: u64,

    // Popups and toggles
    pub alert: Option<String>,
    pub show_error_details: bool,

    // Animation state
    pub animation_frame: u8,

    // Panel areas for mouse hit-testing (updated during render)
    pub sidebar_area: Option<Rect>,
    pub chat_area: Option<Rect>,
}

impl App {
    pub fn new(
        config: &Config,
        backend: Arc<dyn Backend>,
        theme_store: Box<dyn ThemeStore + Send>,
        theme: Theme,
        tracking: PointerTracking,
    ) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Chat,
            chat: ChatController::new(config.agent_mode.unwrap_or_default()),
            input: LineEditor::default(),
            backend,
            query_task: None,
            attach_input: LineEditor::default(),
            attach_task: None,
            theme,
            theme_store,
            sidebar: ResizeController::new(tracking),
            scroll_back: 0,
            content_height: 0,
            view_height: 0,
            seen_revision: 0,
            alert: None,
            show_error_details: false,
            animation_frame: 0,
            sidebar_area: None,
            chat_area: None,
        }
    }

    /// Sidebar width in terminal columns.
    pub fn sidebar_columns(&self) -> u16 {
        (self.sidebar.width() / PX_PER_COLUMN) as u16
    }

    pub fn submit(&mut self) {
        if self.query_task.is_some() {
            return;
        }
        let Some(request) = self.chat.begin_submit(&self.input.text) else {
            return;
        };
        self.input.clear();

        let backend = Arc::clone(&self.backend);
        self.query_task = Some(tokio::spawn(async move { backend.ask(&request).await }));
    }

    /// Collects finished background work. Called on every tick.
    pub fn poll_tasks(&mut self) {
        if let Some(task) = self.query_task.as_mut() {
            if let Some(joined) = task.now_or_never() {
                self.query_task = None;
                let result = joined.unwrap_or_else(|e| Err(BackendError::Http(e.to_string())));
                self.chat.complete_submit(result);
                // The controller dropped the attachment; drop its read and path too
                self.abort_attach_task();
                self.attach_input.clear();
                if self.input_mode == InputMode::AttachPath {
                    self.input_mode = InputMode::Chat;
                }
            }
        }

        if let Some((ticket, task)) = self.attach_task.as_mut() {
            let ticket = *ticket;
            if let Some(joined) = task.now_or_never() {
                self.attach_task = None;
                let outcome = joined.unwrap_or(ReadOutcome::Cancelled);
                if !self.chat.finish_attachment(ticket, outcome) {
                    info!(ticket, "ignoring stale attachment read");
                }
            }
        }
    }

    pub fn open_attach_prompt(&mut self) {
        self.attach_input.clear();
        self.input_mode = InputMode::AttachPath;
    }

    /// Validates the typed path and starts reading it in the background.
    pub fn confirm_attachment(&mut self) {
        let raw = self.attach_input.text.trim().to_string();
        self.input_mode = InputMode::Chat;
        if raw.is_empty() {
            return;
        }
        let path = expand_home(&raw);

        let name = match check_selection(&path) {
            Ok(name) => name,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "attachment rejected");
                self.alert = Some(e.to_string());
                return;
            }
        };

        self.abort_attach_task();
        let ticket = self.chat.begin_attachment(name);
        let task = tokio::spawn(async move {
            match read_attachment(&path).await {
                Ok(content) => ReadOutcome::Loaded(content),
                Err(e) => ReadOutcome::Failed(e.to_string()),
            }
        });
        self.attach_task = Some((ticket, task));
    }

    /// Esc outside the path prompt: abandon a read that is still running.
    pub fn cancel_attachment(&mut self) {
        if self.chat.cancel_attachment() {
            self.abort_attach_task();
        }
    }

    pub fn remove_attachment(&mut self) {
        self.abort_attach_task();
        self.chat.remove_attachment();
        self.attach_input.clear();
    }

    fn abort_attach_task(&mut self) {
        if let Some((_, task)) = self.attach_task.take() {
            task.abort();
        }
    }

    pub fn toggle_theme(&mut self) {
        self.theme = self.theme.toggled();
        info!(theme = self.theme.as_str(), "theme toggled");
        if let Err(e) = self.theme_store.save(self.theme) {
            warn!(error = %e, "failed to persist theme");
        }
    }

    pub fn cycle_agent_mode(&mut self) {
        let mode = self.chat.cycle_agent_mode();
        info!(agent_mode = mode.as_str(), "agent mode changed");
    }

    pub fn toggle_error_details(&mut self) {
        self.show_error_details = !self.show_error_details;
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    fn max_scroll(&self) -> u16 {
        self.content_height.saturating_sub(self.view_height)
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.scroll_back = self.scroll_back.saturating_add(rows).min(self.max_scroll());
    }

    pub fn scroll_down(&mut self, rows: u16) {
        self.scroll_back = self.scroll_back.saturating_sub(rows);
    }

    pub fn page_rows(&self) -> u16 {
        self.view_height.saturating_sub(2).max(1)
    }

    /// Returns to the end of the list after any change to the messages or
    /// the loading flag.
    pub fn sync_scroll(&mut self) {
        let revision = self.chat.revision();
        if revision != self.seen_revision {
            self.seen_revision = revision;
            self.scroll_back = 0;
        }
    }

    pub fn begin_sidebar_drag(&mut self, column: u16) {
        self.sidebar.begin_drag(column as i32 * PX_PER_COLUMN as i32);
    }

    pub fn drag_sidebar(&mut self, column: u16) {
        self.sidebar.drag_to(column as i32 * PX_PER_COLUMN as i32);
    }

    pub fn end_sidebar_drag(&mut self) {
        self.sidebar.end_drag();
    }

    pub fn tick_animation(&mut self) {
        if self.chat.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(raw)),
        None => PathBuf::from(raw),
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(task) = self.query_task.take() {
            task.abort();
        }
        self.abort_attach_task();
        self.sidebar.end_drag();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use insight_core::{AskRequest, ConfigError};
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoBackend;

    #[async_trait]
    impl Backend for EchoBackend {
        async fn ask(&self, request: &AskRequest) -> Result<Value, BackendError> {
            Ok(json!({"response": format!("echo: {}", request.prompt), "thread_id": "t-1"}))
        }
    }

    #[derive(Clone, Default)]
    struct SharedStore(Arc<Mutex<Option<Theme>>>);

    impl ThemeStore for SharedStore {
        fn load(&self) -> Option<Theme> {
            *self.0.lock().unwrap()
        }

        fn save(&mut self, theme: Theme) -> Result<(), ConfigError> {
            *self.0.lock().unwrap() = Some(theme);
            Ok(())
        }
    }

    fn test_app(store: SharedStore) -> App {
        App::new(
            &Config::new(),
            Arc::new(EchoBackend),
            Box::new(store),
            Theme::Dark,
            PointerTracking::default(),
        )
    }

    async fn settle(app: &mut App) {
        for _ in 0..100 {
            if app.query_task.is_none() && app.attach_task.is_none() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            app.poll_tasks();
        }
        panic!("background tasks did not finish");
    }

    #[test]
    fn line_editor_handles_multibyte_text() {
        let mut editor = LineEditor::default();
        for c in "héllo".chars() {
            editor.insert(c);
        }
        editor.left();
        editor.left();
        editor.backspace();
        assert_eq!(editor.text, "hélo");
        editor.home();
        editor.delete();
        assert_eq!(editor.text, "élo");
        editor.end();
        assert_eq!(editor.cursor, 3);
    }

    #[tokio::test]
    async fn submit_round_trip_clears_loading() {
        let mut app = test_app(SharedStore::default());
        app.input.text = "hello".into();
        app.submit();
        assert!(app.chat.is_loading());
        assert!(app.input.text.is_empty());

        settle(&mut app).await;
        assert!(!app.chat.is_loading());
        let last = app.chat.messages().last().unwrap();
        assert_eq!(last.text.as_deref(), Some("echo: hello"));
        assert_eq!(app.chat.thread_id(), Some("t-1"));
    }

    #[tokio::test]
    async fn blank_submit_spawns_nothing() {
        let mut app = test_app(SharedStore::default());
        app.input.text = "   ".into();
        app.submit();
        assert!(app.query_task.is_none());
        assert!(app.chat.messages().is_empty());
    }

    #[test]
    fn theme_toggle_is_persisted() {
        let store = SharedStore::default();
        let mut app = test_app(store.clone());
        app.toggle_theme();
        assert_eq!(app.theme, Theme::Light);
        assert_eq!(store.load(), Some(Theme::Light));
        app.toggle_theme();
        assert_eq!(store.load(), Some(Theme::Dark));
    }

    #[tokio::test]
    async fn unsupported_attachment_raises_alert() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"png").unwrap();

        let mut app = test_app(SharedStore::default());
        app.open_attach_prompt();
        app.attach_input.text = path.display().to_string();
        app.confirm_attachment();
        assert!(app.alert.is_some());
        assert!(app.chat.uploaded_file().is_none());
        assert!(app.chat.messages().is_empty());
        assert_eq!(app.input_mode, InputMode::Chat);
    }

    #[tokio::test]
    async fn attachment_is_read_then_cleared_by_submit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let mut app = test_app(SharedStore::default());
        app.attach_input.text = path.display().to_string();
        app.confirm_attachment();
        settle(&mut app).await;
        assert_eq!(
            app.chat.uploaded_file().and_then(|f| f.usable_content()),
            Some("a,b\n1,2\n")
        );

        app.submit();
        settle(&mut app).await;
        assert!(app.chat.uploaded_file().is_none());
        assert_eq!(app.chat.messages()[0].file_name.as_deref(), Some("data.csv"));
    }

    #[test]
    fn changes_snap_scroll_to_end() {
        let mut app = test_app(SharedStore::default());
        app.content_height = 100;
        app.view_height = 20;
        app.scroll_up(500);
        assert_eq!(app.scroll_back, 80);

        app.sync_scroll();
        assert_eq!(app.scroll_back, 80);

        app.input.text = "new".into();
        let _ = app.chat.begin_submit(&app.input.text.clone());
        app.sync_scroll();
        assert_eq!(app.scroll_back, 0);
    }

    #[test]
    fn sidebar_drag_uses_column_pixels() {
        let tracking = PointerTracking::default();
        let mut app = App::new(
            &Config::new(),
            Arc::new(EchoBackend),
            Box::new(SharedStore::default()),
            Theme::Dark,
            tracking.clone(),
        );
        app.begin_sidebar_drag(30);
        assert!(tracking.is_attached());
        app.drag_sidebar(40);
        assert_eq!(app.sidebar.width(), 400);
        app.drag_sidebar(200);
        assert_eq!(app.sidebar_columns(), 50);
        app.end_sidebar_drag();
        assert!(!tracking.is_attached());
    }
}
