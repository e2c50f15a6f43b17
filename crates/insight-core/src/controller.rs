//! Conversation orchestration: submission, response handling and the
//! attachment lifecycle. Owns no I/O; the backend is passed in and file reads
//! report back through tickets.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agent_mode::AgentMode;
use crate::attachment::{ReadOutcome, UploadedFile};
use crate::backend::{AskRequest, AskResponse, Backend};
use crate::chart::validate_chart_data;
use crate::error::BackendError;
use crate::interpret::{extract_chart_data, RawResponse};
use crate::state::{Message, TokenUsage};

/// Sent in place of an empty prompt when only a file is attached.
pub const DEFAULT_FILE_PROMPT: &str = "Please analyze the attached file.";
pub const TRANSPORT_ERROR_TEXT: &str =
    "Sorry, I couldn't reach the analysis service. Please try again.";

const COLUMN_KEYS: [&str; 3] = ["valid_columns", "available_columns", "columns"];

#[derive(Debug, Default)]
pub struct ChatController {
    messages: Vec<Message>,
    loading: bool,
    uploaded_file: Option<UploadedFile>,
    attachment_ticket: u64,
    thread_id: Option<String>,
    agent_mode: AgentMode,
    revision: u64,
}

impl ChatController {
    pub fn new(agent_mode: AgentMode) -> Self {
        Self {
            agent_mode,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn uploaded_file(&self) -> Option<&UploadedFile> {
        self.uploaded_file.as_ref()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn agent_mode(&self) -> AgentMode {
        self.agent_mode
    }

    pub fn cycle_agent_mode(&mut self) -> AgentMode {
        self.agent_mode = self.agent_mode.next();
        self.agent_mode
    }

    /// Bumped whenever the message sequence or the loading flag changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn total_tokens(&self) -> TokenUsage {
        self.messages
            .iter()
            .filter_map(|m| m.token_usage)
            .fold(TokenUsage::default(), |acc, u| TokenUsage {
                input: acc.input.saturating_add(u.input),
                output: acc.output.saturating_add(u.output),
            })
    }

    /// Appends the user turn and returns the request to send, or `None` when
    /// there is nothing to send or a request is already outstanding.
    pub fn begin_submit(&mut self, prompt: &str) -> Option<AskRequest> {
        if self.loading {
            return None;
        }
        let prompt = prompt.trim();
        let file = self
            .uploaded_file
            .as_ref()
            .filter(|f| f.usable_content().is_some());
        if prompt.is_empty() && file.is_none() {
            return None;
        }

        let request = AskRequest {
            agent_mode: self.agent_mode,
            prompt: if prompt.is_empty() {
                DEFAULT_FILE_PROMPT.to_string()
            } else {
                prompt.to_string()
            },
            file_content: file.and_then(|f| f.usable_content()).map(str::to_string),
            chat_history: self.messages.iter().map(Message::history_entry).collect(),
            thread_id: self.thread_id.clone(),
        };

        info!(
            agent_mode = self.agent_mode.as_str(),
            with_file = request.file_content.is_some(),
            "submitting prompt"
        );
        self.messages.push(Message::user(prompt, file));
        self.loading = true;
        self.revision += 1;
        Some(request)
    }

    /// Records the outcome of the request started by [`begin_submit`].
    ///
    /// [`begin_submit`]: ChatController::begin_submit
    pub fn complete_submit(&mut self, result: Result<Value, BackendError>) {
        let message = match result {
            Ok(body) => self.agent_reply(&body),
            Err(e) => {
                warn!(error = %e, "request failed");
                Message::agent_error(TRANSPORT_ERROR_TEXT, Some(transport_details(&e)))
            }
        };
        self.messages.push(message);
        self.loading = false;
        self.clear_attachment();
        self.revision += 1;
    }

    pub async fn submit<B: Backend + ?Sized>(&mut self, backend: &B, prompt: &str) -> bool {
        let Some(request) = self.begin_submit(prompt) else {
            return false;
        };
        let result = backend.ask(&request).await;
        self.complete_submit(result);
        true
    }

    fn agent_reply(&mut self, body: &Value) -> Message {
        let response = AskResponse::from_value(body);
        let mut text = response.response_text();

        let mut message = if response.is_error() {
            if let Some(context) = response.details.as_ref().and_then(error_context) {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(&context);
            }
            if text.is_empty() {
                text = "The agent reported an error.".to_string();
            }
            Message::agent_error(text.clone(), response.details.clone())
        } else {
            Message::agent(text.clone())
        };

        if let Some(thread_id) = &response.thread_id {
            self.thread_id = Some(thread_id.clone());
        }
        message.thread_id = response.thread_id.clone();
        message.token_usage = response.token_usage();

        if let Some(payload) = find_chart_payload(body, &response, &text) {
            match validate_chart_data(&payload) {
                Ok(_) => {
                    if is_bare_json(&text) {
                        message.text = None;
                    }
                    message = message.with_chart(payload);
                }
                Err(e) => {
                    warn!(reason = %e, "chart data rejected");
                    message.chart_payload = Some(payload);
                }
            }
        }

        info!(
            graph = message.is_graph(),
            error = message.is_error,
            "response received"
        );
        message
    }

    /// Starts tracking a newly selected file. Any earlier read becomes stale.
    pub fn begin_attachment(&mut self, name: impl Into<String>) -> u64 {
        self.attachment_ticket += 1;
        self.uploaded_file = Some(UploadedFile::pending(name));
        self.attachment_ticket
    }

    /// Applies a read result. Returns `false` when `ticket` is stale.
    pub fn finish_attachment(&mut self, ticket: u64, outcome: ReadOutcome) -> bool {
        if ticket != self.attachment_ticket {
            return false;
        }
        match outcome {
            ReadOutcome::Loaded(content) => {
                if let Some(file) = self.uploaded_file.as_mut() {
                    file.content = Some(content);
                    file.loading = false;
                }
            }
            ReadOutcome::Failed(error) => {
                if let Some(file) = self.uploaded_file.as_mut() {
                    file.error = Some(error);
                    file.loading = false;
                }
            }
            ReadOutcome::Cancelled => self.clear_attachment(),
        }
        true
    }

    /// Abandons an in-flight read. A file that already loaded is kept.
    pub fn cancel_attachment(&mut self) -> bool {
        if self.uploaded_file.as_ref().is_some_and(|f| f.loading) {
            self.clear_attachment();
            return true;
        }
        false
    }

    pub fn remove_attachment(&mut self) {
        self.clear_attachment();
    }

    fn clear_attachment(&mut self) {
        self.uploaded_file = None;
        self.attachment_ticket += 1;
    }
}

fn find_chart_payload(body: &Value, response: &AskResponse, text: &str) -> Option<Value> {
    extract_chart_data(RawResponse::Object(body))
        .or_else(|| match &response.response {
            Some(value @ Value::Object(_)) => extract_chart_data(RawResponse::Object(value)),
            _ => None,
        })
        .or_else(|| extract_chart_data(RawResponse::Text(text)))
}

fn is_bare_json(text: &str) -> bool {
    let trimmed = text.trim();
    trimmed.starts_with('{') && serde_json::from_str::<Value>(trimmed).is_ok()
}

/// Human-readable context from an error `details` value, such as the list of
/// valid column names.
pub fn error_context(details: &Value) -> Option<String> {
    match details {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => join_strings(items),
        Value::Object(map) => COLUMN_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array).and_then(|a| join_strings(a)))
            .map(|cols| format!("Valid columns: {}", cols))
            .or_else(|| {
                ["error", "message", "hint"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .map(str::to_string)
            }),
        _ => None,
    }
}

fn join_strings(items: &[Value]) -> Option<String> {
    let parts: Vec<String> = items
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}

/// Diagnostic payload attached to transport failures for the details view.
pub fn transport_details(error: &BackendError) -> Value {
    json!({ "error": error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MessageKind, Sender};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct MockBackend {
        reply: Result<Value, BackendError>,
        calls: Mutex<Vec<AskRequest>>,
    }

    impl MockBackend {
        fn ok(body: Value) -> Self {
            Self {
                reply: Ok(body),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: BackendError) -> Self {
            Self {
                reply: Err(error),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<AskRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn ask(&self, request: &AskRequest) -> Result<Value, BackendError> {
            self.calls.lock().unwrap().push(request.clone());
            self.reply.clone()
        }
    }

    fn loaded_file(ctl: &mut ChatController, name: &str, content: &str) {
        let ticket = ctl.begin_attachment(name);
        assert!(ctl.finish_attachment(ticket, ReadOutcome::Loaded(content.into())));
    }

    #[tokio::test]
    async fn empty_prompt_without_file_is_ignored() {
        let backend = MockBackend::ok(json!({"response": "unused"}));
        let mut ctl = ChatController::default();
        assert!(!ctl.submit(&backend, "   ").await);
        assert!(ctl.messages().is_empty());
        assert!(backend.calls().is_empty());
        assert_eq!(ctl.revision(), 0);
    }

    #[tokio::test]
    async fn transport_failure_adds_one_error_message() {
        let backend = MockBackend::failing(BackendError::Http("connection refused".into()));
        let mut ctl = ChatController::default();
        assert!(ctl.submit(&backend, "hello").await);

        let messages = ctl.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages.iter().filter(|m| m.sender == Sender::Agent).count(), 1);
        let reply = &messages[1];
        assert!(reply.is_error);
        assert_eq!(reply.text.as_deref(), Some(TRANSPORT_ERROR_TEXT));
        assert!(reply.error_details.is_some());
        assert!(!ctl.is_loading());
    }

    #[tokio::test]
    async fn chart_in_dedicated_field_becomes_graph_message() {
        let backend = MockBackend::ok(json!({
            "status": "success",
            "response": "Here is the breakdown.",
            "graph_data": {"kind": "pie", "labels": ["a", "b"], "values": [1, 3]},
            "thread_id": "thread-9",
            "input_tokens": 10,
            "output_tokens": 4
        }));
        let mut ctl = ChatController::default();
        ctl.submit(&backend, "chart it").await;

        let reply = ctl.messages().last().unwrap();
        assert_eq!(reply.kind, MessageKind::Graph);
        assert_eq!(reply.text.as_deref(), Some("Here is the breakdown."));
        assert_eq!(reply.thread_id.as_deref(), Some("thread-9"));
        assert_eq!(reply.token_usage, Some(TokenUsage { input: 10, output: 4 }));
        assert_eq!(ctl.total_tokens(), TokenUsage { input: 10, output: 4 });
    }

    #[tokio::test]
    async fn huge_token_counts_saturate_the_total() {
        let backend = MockBackend::ok(json!({
            "response": "ok",
            "input_tokens": 1e30,
            "output_tokens": 2
        }));
        let mut ctl = ChatController::default();
        ctl.submit(&backend, "first").await;
        ctl.submit(&backend, "second").await;

        assert_eq!(ctl.total_tokens(), TokenUsage { input: u64::MAX, output: 4 });
    }

    #[tokio::test]
    async fn chart_embedded_in_text_is_extracted() {
        let text = "Result:\n```json\n{\"graph_data\": {\"kind\": \"bar\", \"labels\": [\"x\"], \"values\": [2]}}\n```";
        let backend = MockBackend::ok(json!({"response": text}));
        let mut ctl = ChatController::default();
        ctl.submit(&backend, "plot").await;
        assert!(ctl.messages()[1].is_graph());
    }

    #[tokio::test]
    async fn invalid_chart_stays_text_with_payload() {
        let backend = MockBackend::ok(json!({
            "response": "see chart",
            "graph_data": {"kind": "bar", "labels": ["a", "b"], "values": [1]}
        }));
        let mut ctl = ChatController::default();
        ctl.submit(&backend, "plot").await;
        let reply = &ctl.messages()[1];
        assert_eq!(reply.kind, MessageKind::Text);
        assert!(reply.chart_payload.is_some());
    }

    #[tokio::test]
    async fn error_status_appends_valid_columns() {
        let backend = MockBackend::ok(json!({
            "status": "error",
            "message": "Unknown column 'regoin'",
            "details": {"valid_columns": ["region", "total"]}
        }));
        let mut ctl = ChatController::default();
        ctl.submit(&backend, "sum by regoin").await;
        let reply = &ctl.messages()[1];
        assert!(reply.is_error);
        let text = reply.text.as_deref().unwrap();
        assert!(text.starts_with("Unknown column 'regoin'"));
        assert!(text.ends_with("Valid columns: region, total"));
    }

    #[tokio::test]
    async fn thread_id_and_history_carry_to_next_turn() {
        let backend = MockBackend::ok(json!({"response": "ok", "thread_id": "t-1"}));
        let mut ctl = ChatController::new(AgentMode::Visualization);
        ctl.submit(&backend, "first").await;
        ctl.submit(&backend, "second").await;

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].thread_id, None);
        assert!(calls[0].chat_history.is_empty());
        assert_eq!(calls[1].thread_id.as_deref(), Some("t-1"));
        assert_eq!(calls[1].agent_mode, AgentMode::Visualization);
        let roles: Vec<&str> = calls[1].chat_history.iter().map(|h| h.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant"]);
    }

    #[tokio::test]
    async fn file_only_submission_uses_default_prompt_and_clears_file() {
        let backend = MockBackend::ok(json!({"response": "analyzed"}));
        let mut ctl = ChatController::default();
        loaded_file(&mut ctl, "sales.csv", "region,total\nwest,3");
        assert!(ctl.submit(&backend, "").await);

        let call = &backend.calls()[0];
        assert_eq!(call.prompt, DEFAULT_FILE_PROMPT);
        assert_eq!(call.file_content.as_deref(), Some("region,total\nwest,3"));
        assert_eq!(ctl.messages()[0].file_name.as_deref(), Some("sales.csv"));
        assert!(ctl.messages()[0].text.is_none());
        assert!(ctl.uploaded_file().is_none());
    }

    #[test]
    fn submit_is_rejected_while_loading() {
        let mut ctl = ChatController::default();
        assert!(ctl.begin_submit("one").is_some());
        assert!(ctl.is_loading());
        assert!(ctl.begin_submit("two").is_none());
        assert_eq!(ctl.messages().len(), 1);
    }

    #[test]
    fn stale_read_is_ignored() {
        let mut ctl = ChatController::default();
        let first = ctl.begin_attachment("a.txt");
        let second = ctl.begin_attachment("b.txt");
        assert!(!ctl.finish_attachment(first, ReadOutcome::Loaded("old".into())));
        assert!(ctl.finish_attachment(second, ReadOutcome::Loaded("new".into())));
        let file = ctl.uploaded_file().unwrap();
        assert_eq!(file.name, "b.txt");
        assert_eq!(file.usable_content(), Some("new"));
    }

    #[test]
    fn cancel_only_drops_in_flight_reads() {
        let mut ctl = ChatController::default();
        let ticket = ctl.begin_attachment("a.txt");
        assert!(ctl.cancel_attachment());
        assert!(ctl.uploaded_file().is_none());
        assert!(!ctl.finish_attachment(ticket, ReadOutcome::Loaded("late".into())));

        loaded_file(&mut ctl, "b.txt", "kept");
        assert!(!ctl.cancel_attachment());
        assert!(ctl.uploaded_file().is_some());
        ctl.remove_attachment();
        assert!(ctl.uploaded_file().is_none());
    }

    #[test]
    fn failed_read_is_not_sent() {
        let mut ctl = ChatController::default();
        let ticket = ctl.begin_attachment("a.txt");
        ctl.finish_attachment(ticket, ReadOutcome::Failed("denied".into()));
        assert!(ctl.begin_submit("").is_none());
        let request = ctl.begin_submit("question").unwrap();
        assert!(request.file_content.is_none());
    }

    #[test]
    fn error_context_shapes() {
        assert_eq!(
            error_context(&json!({"available_columns": ["a", "b"]})).as_deref(),
            Some("Valid columns: a, b")
        );
        assert_eq!(error_context(&json!("bad query")).as_deref(), Some("bad query"));
        assert_eq!(error_context(&json!({"error": "timeout"})).as_deref(), Some("timeout"));
        assert_eq!(error_context(&json!(42)), None);
    }
}
