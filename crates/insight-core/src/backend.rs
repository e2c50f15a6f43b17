//! Request/response types for the analytics backend and its HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::agent_mode::AgentMode;
use crate::error::BackendError;
use crate::state::TokenUsage;

/// One prior turn sent as conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AskRequest {
    #[serde(rename = "agentMode")]
    pub agent_mode: AgentMode,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    pub chat_history: Vec<HistoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Decoded `/ask` reply. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AskResponse {
    pub status: Option<String>,
    pub response: Option<Value>,
    pub thread_id: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub message: Option<String>,
    pub details: Option<Value>,
}

impl AskResponse {
    pub fn from_value(body: &Value) -> Self {
        let str_field = |key: &str| {
            body.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let count_field = |key: &str| {
            body.get(key).and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            })
        };

        Self {
            status: str_field("status"),
            response: body.get("response").filter(|v| !v.is_null()).cloned(),
            thread_id: str_field("thread_id"),
            input_tokens: count_field("input_tokens"),
            output_tokens: count_field("output_tokens"),
            message: str_field("message"),
            details: body.get("details").filter(|v| !v.is_null()).cloned(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some("error")
    }

    /// Text to show for this reply.
    pub fn response_text(&self) -> String {
        match &self.response {
            Some(Value::String(s)) => s.clone(),
            Some(obj @ Value::Object(map)) => ["response", "text", "content", "message"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
                .unwrap_or_else(|| serde_json::to_string_pretty(obj).unwrap_or_default()),
            Some(other) => other.to_string(),
            None => self.message.clone().unwrap_or_default(),
        }
    }

    pub fn token_usage(&self) -> Option<TokenUsage> {
        if self.input_tokens.is_none() && self.output_tokens.is_none() {
            return None;
        }
        Some(TokenUsage {
            input: self.input_tokens.unwrap_or(0),
            output: self.output_tokens.unwrap_or(0),
        })
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// Sends one request and returns the raw JSON body.
    async fn ask(&self, request: &AskRequest) -> Result<Value, BackendError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackendError> {
        let Some(timeout) = timeout else {
            return Ok(Self::new(base_url));
        };
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn ask(&self, request: &AskRequest) -> Result<Value, BackendError> {
        let url = format!("{}/ask", self.base_url);
        info!(
            url = %url,
            agent_mode = request.agent_mode.as_str(),
            history = request.chat_history.len(),
            has_file = request.file_content.is_some(),
            "sending request"
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            });
        }

        debug!(bytes = body.len(), "response received");
        serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

/// FastAPI puts the reason under `detail`; anything else is shown verbatim.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.trim().to_string(),
        },
        _ => body.trim().to_string(),
    }
}
