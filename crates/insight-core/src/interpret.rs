//! Best-effort extraction of chart data from backend responses.
//!
//! Agents return chart data either as a dedicated field or embedded somewhere
//! in their prose. Each strategy below is an independent attempt; the first
//! one that yields a payload wins.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Both spellings appear in agent output.
const GRAPH_KEYS: [&str; 2] = ["graph_data", "graphData"];

/// A backend response as handed to the interpreter.
#[derive(Debug, Clone, Copy)]
pub enum RawResponse<'a> {
    Object(&'a Value),
    Text(&'a str),
}

type TextStrategy = fn(&str) -> Option<Value>;

const TEXT_STRATEGIES: [(&str, TextStrategy); 3] = [
    ("whole_string", parse_whole_string),
    ("brace_slice", parse_brace_slice),
    ("fenced_block", parse_fenced_block),
];

/// Returns the chart payload carried by `raw`, if any.
pub fn extract_chart_data(raw: RawResponse<'_>) -> Option<Value> {
    match raw {
        RawResponse::Object(Value::String(text)) => extract_from_text(text),
        RawResponse::Object(value) => graph_field(value),
        RawResponse::Text(text) => extract_from_text(text),
    }
}

fn extract_from_text(text: &str) -> Option<Value> {
    TEXT_STRATEGIES.iter().find_map(|(name, strategy)| {
        let found = strategy(text)?;
        debug!(strategy = *name, "chart data found in response text");
        Some(found)
    })
}

fn graph_field(value: &Value) -> Option<Value> {
    GRAPH_KEYS
        .iter()
        .find_map(|key| value.get(key).filter(|v| !v.is_null()).cloned())
}

fn parse_json(candidate: &str) -> Option<Value> {
    serde_json::from_str::<Value>(candidate.trim()).ok()
}

fn parse_whole_string(text: &str) -> Option<Value> {
    parse_json(text).as_ref().and_then(graph_field)
}

fn parse_brace_slice(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_json(&text[start..=end]).as_ref().and_then(graph_field)
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
    })
}

fn parse_fenced_block(text: &str) -> Option<Value> {
    fence_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|body| parse_json(body.as_str()).as_ref().and_then(graph_field))
}
