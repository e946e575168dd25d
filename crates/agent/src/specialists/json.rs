//! Lenient extraction of the JSON object a decision unit ends with.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse the final answer as a JSON object.
///
/// Accepts a bare object, one wrapped in a ``` fence, or an object embedded
/// in surrounding prose.
pub fn parse_object(text: &str) -> Option<Value> {
    let body = strip_fence(text.trim());
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&body[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Parse the final answer into `T`.
pub fn parse_answer<T: DeserializeOwned>(text: &str) -> Option<T> {
    parse_object(text).and_then(|v| serde_json::from_value(v).ok())
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the language tag line.
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
