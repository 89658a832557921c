//! Response normalization.
//!
//! Every upstream response passes through [`normalize_response`] before its body reaches a tool
//! caller:
//! - 2xx bodies are tidied: empty bodies and `null` become `{}`, `{"data": null}` becomes
//!   `{"data": {}}`, and null-valued keys are stripped recursively.
//! - anything else is rewritten into a uniform `{"error": {...}}` envelope and returned as an
//!   [`UpstreamError`], with a rate-limit hint for 429s.

use crate::error::{HttpToolsError, Result};
use base64::Engine as _;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// A normalized 2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBody {
    /// Body text handed to the caller.
    ///
    /// This is the upstream text verbatim unless normalization changed the JSON structure, in which
    /// case it is the re-encoded structure.
    pub text: String,
    /// Parsed JSON body. `None` for non-JSON bodies, which pass through untouched.
    pub json: Option<Value>,
}

impl NormalizedBody {
    fn from_value(value: Value) -> Result<Self> {
        let text = serde_json::to_string(&value)
            .map_err(|e| HttpToolsError::Normalization(e.to_string()))?;
        Ok(Self {
            text,
            json: Some(value),
        })
    }

    fn empty_object() -> Self {
        Self {
            text: "{}".to_string(),
            json: Some(Value::Object(Map::new())),
        }
    }
}

/// A non-2xx upstream response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub status: u16,
    /// `{"error": {...}}` with only the non-null descriptor fields.
    pub envelope: Value,
    pub message: String,
}

/// Normalize an upstream response.
///
/// # Errors
///
/// Returns [`HttpToolsError::Upstream`] for any status outside 200-299, and
/// [`HttpToolsError::Normalization`] if a cleaned body cannot be re-encoded.
pub fn normalize_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<NormalizedBody> {
    if status.is_success() {
        normalize_success(status, headers, body)
    } else {
        Err(HttpToolsError::Upstream(upstream_error(status, headers, body)))
    }
}

fn normalize_success(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Result<NormalizedBody> {
    if status == StatusCode::NO_CONTENT || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(NormalizedBody::empty_object());
    }

    let Ok(text) = std::str::from_utf8(body) else {
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        return NormalizedBody::from_value(base64_body(body, content_type));
    };

    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        return Ok(NormalizedBody {
            text: text.to_string(),
            json: None,
        });
    };

    let cleaned = clean_success_value(parsed.clone());
    if cleaned == parsed {
        Ok(NormalizedBody {
            text: text.to_string(),
            json: Some(parsed),
        })
    } else {
        NormalizedBody::from_value(cleaned)
    }
}

fn clean_success_value(value: Value) -> Value {
    match value {
        Value::Null => Value::Object(Map::new()),
        Value::Object(mut map) if map.get("data").is_some_and(Value::is_null) => {
            map.insert("data".to_string(), Value::Object(Map::new()));
            Value::Object(map)
        }
        mut other @ (Value::Object(_) | Value::Array(_)) => {
            drop_nulls_in_place(&mut other);
            other
        }
        scalar => scalar,
    }
}

fn drop_nulls_in_place(v: &mut Value) {
    match v {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            for v in map.values_mut() {
                drop_nulls_in_place(v);
            }
        }
        Value::Array(arr) => {
            arr.retain(|v| !v.is_null());
            for v in arr {
                drop_nulls_in_place(v);
            }
        }
        _ => {}
    }
}

fn base64_body(bytes: &[u8], content_type: Option<&str>) -> Value {
    json!({
        "encoding": "base64",
        "mimeType": content_type,
        "data": base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn upstream_error(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> UpstreamError {
    let text = String::from_utf8_lossy(body);
    let parsed: Option<Value> = serde_json::from_str(&text).ok();
    let descriptor = error_descriptor(status, parsed.as_ref(), text.trim());

    let mut message = format!("YNAB API error {}", status.as_u16());
    if let Some(name) = descriptor.get("name").and_then(Value::as_str) {
        message.push(' ');
        message.push_str(name);
    }
    if let Some(id) = descriptor.get("id").and_then(Value::as_str) {
        message.push_str(&format!(" (id {id})"));
    }
    if let Some(detail) = descriptor.get("detail").and_then(Value::as_str) {
        message.push_str(": ");
        message.push_str(detail);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        match headers.get(RETRY_AFTER).and_then(|v| v.to_str().ok()) {
            Some(retry_after) => message.push_str(&format!(
                ". Rate limit exceeded; retry after {retry_after} (Retry-After header)"
            )),
            None => message.push_str(". Rate limit exceeded; wait before retrying"),
        }
    }

    UpstreamError {
        status: status.as_u16(),
        envelope: json!({ "error": Value::Object(descriptor) }),
        message,
    }
}

/// Pull `id`/`name`/`detail` out of an error body.
///
/// YNAB nests these under `error`; anything else is treated as a bare error value. The detail falls
/// back to the raw body text and then to the status reason phrase.
fn error_descriptor(status: StatusCode, parsed: Option<&Value>, raw: &str) -> Map<String, Value> {
    let source = match parsed {
        Some(Value::Object(map)) => match map.get("error") {
            Some(inner @ Value::Object(_)) => Some(inner),
            Some(Value::String(_)) => map.get("error"),
            _ => parsed,
        },
        other => other,
    };

    let mut out = Map::new();
    out.insert("status".to_string(), json!(status.as_u16()));

    let mut detail: Option<String> = None;
    match source {
        Some(Value::Object(map)) => {
            if let Some(id) = map.get("id").and_then(scalar_to_string) {
                out.insert("id".to_string(), Value::String(id));
            }
            if let Some(name) = map.get("name").and_then(scalar_to_string) {
                out.insert("name".to_string(), Value::String(name));
            }
            detail = ["detail", "message", "error_description"]
                .iter()
                .find_map(|k| map.get(*k).and_then(scalar_to_string));
        }
        Some(Value::String(s)) if !s.trim().is_empty() => detail = Some(s.clone()),
        None if !raw.is_empty() => detail = Some(raw.to_string()),
        _ => {}
    }

    let detail = detail.or_else(|| status.canonical_reason().map(str::to_string));
    if let Some(detail) = detail {
        out.insert("detail".to_string(), Value::String(detail));
    }
    out
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
