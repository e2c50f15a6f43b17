use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Backend error ({status}): {detail}")]
    Status { status: u16, detail: String },

    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl BackendError {
    /// The most specific diagnostic text available, for display next to a
    /// failed turn.
    pub fn detail(&self) -> &str {
        match self {
            BackendError::Http(msg) | BackendError::Decode(msg) => msg,
            BackendError::Status { detail, .. } => detail,
        }
    }
}

#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("{name}: unsupported file type (accepted: .txt, .csv, .json, .pdf, .doc, .docx)")]
    UnsupportedType { name: String },

    #[error("{name} is {size} bytes, which exceeds the 200MB limit")]
    TooLarge { name: String, size: u64 },

    #[error("{name} is not a regular file")]
    NotAFile { name: String },

    #[error("Failed to read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl AttachmentError {
    /// Validation failures are rejected up front and never reach the
    /// uploaded-file state.
    pub fn is_validation(&self) -> bool {
        !matches!(self, AttachmentError::Io { .. })
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartDataError {
    #[error("chart data must be a JSON object")]
    NotAnObject,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unsupported chart type `{0}` (expected bar, line or pie)")]
    UnsupportedKind(String),

    #[error("`{0}` must be an array")]
    NotAnArray(&'static str),

    #[error("labels ({labels}) and values ({values}) have different lengths")]
    LengthMismatch { labels: usize, values: usize },

    #[error("chart data has no points")]
    Empty,

    #[error("value #{index} is not numeric: {value}")]
    NonNumeric { index: usize, value: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
