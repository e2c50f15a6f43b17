//! File attachment selection and reading.

use std::path::Path;

use tracing::{info, warn};

use crate::error::AttachmentError;

pub const MAX_ATTACHMENT_BYTES: u64 = 200 * 1024 * 1024;
pub const ACCEPTED_EXTENSIONS: [&str; 6] = ["txt", "csv", "json", "pdf", "doc", "docx"];

/// The file currently attached to the composer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadedFile {
    pub name: String,
    pub content: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl UploadedFile {
    /// A freshly selected file whose content is still being read.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: None,
            loading: true,
            error: None,
        }
    }

    /// Content that may be sent with a request.
    pub fn usable_content(&self) -> Option<&str> {
        if self.loading || self.error.is_some() {
            return None;
        }
        self.content.as_deref().filter(|c| !c.is_empty())
    }
}

/// How an asynchronous read finished.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Loaded(String),
    Failed(String),
    Cancelled,
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn has_accepted_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| ACCEPTED_EXTENSIONS.contains(&e.as_str()))
}

/// Checks type and size before any content is read. Returns the display name.
pub fn check_selection(path: &Path) -> Result<String, AttachmentError> {
    let name = display_name(path);
    if !has_accepted_extension(path) {
        return Err(AttachmentError::UnsupportedType { name });
    }

    let metadata = std::fs::metadata(path).map_err(|source| AttachmentError::Io {
        name: name.clone(),
        source,
    })?;
    if !metadata.is_file() {
        return Err(AttachmentError::NotAFile { name });
    }
    if metadata.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            name,
            size: metadata.len(),
        });
    }
    Ok(name)
}

/// Reads the whole file as text. Invalid UTF-8 sequences are replaced.
pub async fn read_attachment(path: &Path) -> Result<String, AttachmentError> {
    let name = display_name(path);
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            info!(file = %name, bytes = bytes.len(), "attachment read");
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(source) => {
            warn!(file = %name, error = %source, "attachment read failed");
            Err(AttachmentError::Io { name, source })
        }
    }
}
