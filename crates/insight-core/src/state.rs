//! UI-agnostic conversation types
//!
//! Shared between the interactive TUI and the one-shot CLI path; nothing in
//! here depends on a rendering framework.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attachment::UploadedFile;
use crate::backend::HistoryEntry;

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Agent,
}

impl Sender {
    /// Role name used in `chat_history` entries.
    pub fn role(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Agent => "assistant",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Text,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

/// A single chat turn. Messages are never mutated after being appended.
#[derive(Debug, Clone)]
pub struct Message {
    pub sender: Sender,
    pub text: Option<String>,
    pub kind: MessageKind,
    /// Raw chart payload as received; validated again at render time.
    pub chart_payload: Option<Value>,
    pub thread_id: Option<String>,
    pub token_usage: Option<TokenUsage>,
    pub is_error: bool,
    pub error_details: Option<Value>,
    pub file_name: Option<String>,
    pub file_content: Option<String>,
    pub timestamp: Instant,
}

impl Message {
    fn new(sender: Sender, text: Option<String>) -> Self {
        Self {
            sender,
            text,
            kind: MessageKind::Text,
            chart_payload: None,
            thread_id: None,
            token_usage: None,
            is_error: false,
            error_details: None,
            file_name: None,
            file_content: None,
            timestamp: Instant::now(),
        }
    }

    pub fn user(text: impl Into<String>, file: Option<&UploadedFile>) -> Self {
        let text = text.into();
        let mut msg = Self::new(Sender::User, (!text.is_empty()).then_some(text));
        if let Some(file) = file {
            msg.file_name = Some(file.name.clone());
            msg.file_content = file.usable_content().map(str::to_string);
        }
        msg
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Sender::Agent, Some(text.into()))
    }

    pub fn agent_error(text: impl Into<String>, details: Option<Value>) -> Self {
        let mut msg = Self::agent(text);
        msg.is_error = true;
        msg.error_details = details;
        msg
    }

    pub fn with_chart(mut self, payload: Value) -> Self {
        self.kind = MessageKind::Graph;
        self.chart_payload = Some(payload);
        self
    }

    pub fn is_graph(&self) -> bool {
        self.kind == MessageKind::Graph && self.chart_payload.is_some()
    }

    pub fn history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            role: self.sender.role().to_string(),
            content: self.text.clone().unwrap_or_default(),
        }
    }
}
