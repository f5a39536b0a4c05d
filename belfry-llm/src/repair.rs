//! Lenient repair of generated replies.
//!
//! Backends are asked for `{"roleplay": "..."}` but routinely return prose,
//! JSON wrapped in chatter, or nothing at all. Nothing in here fails on bad
//! model output; only provider-reported errors surface as [`LlmError`].

use serde_json::{Map, Value, json};

use crate::client::{FailureKind, classify_failure};
use crate::error::LlmError;

/// Substring from the first `{` to the last `}`, if they are ordered.
fn brace_region(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

/// Turn assistant text into a reply object.
///
/// - blank text gives `{"roleplay": ""}`
/// - a JSON object is taken as is
/// - JSON buried in prose is extracted; if the brace region does not parse,
///   the result is `{}`
/// - anything else is prose and becomes `{"roleplay": text}`
#[must_use]
pub fn normalize_reply(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return json!({ "roleplay": "" });
    }
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return value;
    }
    match brace_region(trimmed) {
        Some(region) => match serde_json::from_str::<Value>(region) {
            Ok(value @ Value::Object(_)) => value,
            _ => Value::Object(Map::new()),
        },
        None => json!({ "roleplay": trimmed }),
    }
}

/// Pull the assistant text out of a chat-completions response body.
///
/// Reads `choices[0].message.content` (a string, or an array of `{text}`
/// segments), then `choices[0].delta.content`. A body that is not JSON, or
/// has no recognizable shape, is returned whole.
///
/// # Errors
/// Returns an error when the body carries an `error` object: transient for
/// busy or upstream codes, `LlmError::Permanent` otherwise.
pub fn extract_assistant_text(body: &str) -> Result<String, LlmError> {
    let Ok(root) = serde_json::from_str::<Value>(body) else {
        return Ok(body.to_string());
    };

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        return Err(embedded_error(err));
    }

    let Some(choice) = root.get("choices").and_then(|c| c.get(0)) else {
        return Ok(body.to_string());
    };

    if let Some(content) = choice.get("message").and_then(|m| m.get("content")) {
        match content {
            Value::String(s) => return Ok(s.clone()),
            Value::Array(segments) => {
                return Ok(segments
                    .iter()
                    .filter_map(|seg| seg.get("text").and_then(Value::as_str))
                    .collect());
            }
            _ => {}
        }
    }

    if let Some(s) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
    {
        return Ok(s.to_string());
    }

    Ok(body.to_string())
}

fn embedded_error(err: &Value) -> LlmError {
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("(no message)")
        .to_string();
    let code = err
        .get("code")
        .and_then(|c| {
            c.as_u64()
                .or_else(|| c.as_str().and_then(|s| s.parse().ok()))
        })
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(0);

    match classify_failure(code, &message) {
        FailureKind::Transient => LlmError::Unavailable(format!("provider error {code}: {message}")),
        FailureKind::Permanent => LlmError::Permanent {
            status: code,
            message: format!("provider error {code}: {message}"),
        },
    }
}
