//! Best-effort extraction of a `{"conversation": [...]}` document from raw model text.
//!
//! Models asked for JSON still wrap it in prose or code fences now and then.
//! [`extract`] tries progressively looser strategies and returns the first
//! structurally valid document; it never guesses at a partial result.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static FENCED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").expect("valid regex"));

static OBJECT_WITH_CONVERSATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{[\s\S]*"conversation"[\s\S]*\}"#).expect("valid regex"));

static CONVERSATION_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""conversation"\s*:\s*(\[[\s\S]*\])"#).expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no strategy produced a document with a conversation array ({preview})")]
pub struct ExtractionFailure {
    /// First characters of the raw text, for logs.
    pub preview: String,
}

impl ExtractionFailure {
    fn from_raw(raw: &str) -> Self {
        Self {
            preview: raw.chars().take(120).collect(),
        }
    }
}

/// Extracts a conversation document from `raw`.
///
/// Strategies, in order: the whole text as JSON; the first fenced code block;
/// the widest `{...}` span containing a `"conversation"` key; the bare
/// `"conversation": [...]` array wrapped into an object; the span from the
/// first `{` to the last `}`.
pub fn extract(raw: &str) -> Result<Value, ExtractionFailure> {
    let strategies: [fn(&str) -> Option<Value>; 5] = [
        parse_direct,
        parse_fenced,
        parse_object_with_key,
        parse_bare_array,
        parse_outer_braces,
    ];
    strategies
        .iter()
        .filter_map(|strategy| strategy(raw))
        .find(has_conversation_array)
        .ok_or_else(|| ExtractionFailure::from_raw(raw))
}

/// Extracts a single turn object from a one-turn response.
///
/// Accepts a conversation document (its first element), an object with a
/// `turn` field, or a bare object carrying `content`.
pub fn extract_turn(raw: &str) -> Result<Value, ExtractionFailure> {
    if let Ok(doc) = extract(raw) {
        if let Some(first) = doc["conversation"].as_array().and_then(|a| a.first()) {
            return Ok(first.clone());
        }
    }

    let candidates = [parse_direct(raw), parse_fenced(raw), parse_outer_braces(raw)];
    for value in candidates.into_iter().flatten() {
        if let Some(turn) = value.get("turn").filter(|t| t.is_object()) {
            return Ok(turn.clone());
        }
        if value.get("content").is_some() {
            return Ok(value);
        }
    }
    Err(ExtractionFailure::from_raw(raw))
}

fn has_conversation_array(value: &Value) -> bool {
    value
        .get("conversation")
        .map(Value::is_array)
        .unwrap_or(false)
}

fn parse_direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

fn parse_fenced(raw: &str) -> Option<Value> {
    let caps = FENCED_BLOCK.captures(raw)?;
    serde_json::from_str(caps.get(1)?.as_str().trim()).ok()
}

fn parse_object_with_key(raw: &str) -> Option<Value> {
    let m = OBJECT_WITH_CONVERSATION.find(raw)?;
    serde_json::from_str(m.as_str()).ok()
}

fn parse_bare_array(raw: &str) -> Option<Value> {
    let caps = CONVERSATION_ARRAY.captures(raw)?;
    let array: Value = serde_json::from_str(caps.get(1)?.as_str()).ok()?;
    let mut obj = Map::new();
    obj.insert("conversation".into(), array);
    Some(Value::Object(obj))
}

fn parse_outer_braces(raw: &str) -> Option<Value> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}
