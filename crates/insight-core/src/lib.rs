pub mod agent_mode;
pub mod attachment;
pub mod backend;
pub mod chart;
pub mod config;
pub mod controller;
pub mod error;
pub mod interpret;
pub mod resize;
pub mod state;
pub mod theme;

// Re-export main types for convenience
pub use agent_mode::AgentMode;
pub use attachment::{ReadOutcome, UploadedFile};
pub use backend::{AskRequest, AskResponse, Backend, HistoryEntry, HttpBackend};
pub use chart::{build_chart, validate_chart_data, ChartKind, ChartPayload, ChartRendering, ChartSpec};
pub use config::Config;
pub use controller::ChatController;
pub use error::{AttachmentError, BackendError, ChartDataError, ConfigError};
pub use interpret::{extract_chart_data, RawResponse};
pub use resize::{PointerCapture, ResizeController};
pub use state::{Message, MessageKind, Sender, TokenUsage};
pub use theme::{ConfigThemeStore, Theme, ThemeStore};
