//! Tool argument validation.
//!
//! Arguments are checked against the tool's input schema before any upstream request is built, so
//! a malformed call never reaches YNAB. Violations are reported as a JSON-RPC `invalid_params`
//! error whose `data` lists every problem found.

use rmcp::model::{JsonObject, Tool};
use serde_json::{Value, json};

/// Drop null-valued arguments; a null optional argument means "not given".
#[must_use]
pub fn strip_null_arguments(arguments: Option<JsonObject>) -> JsonObject {
    let mut arguments = arguments.unwrap_or_default();
    arguments.retain(|_, v| !v.is_null());
    arguments
}

/// Validate `args` against `tool.input_schema`.
///
/// On failure returns `(message, data)` for an `invalid_params` error. The message favors unknown
/// argument names, with a "did you mean" suggestion when a close match exists.
pub fn validate_tool_arguments(tool: &Tool, args: &JsonObject) -> Result<(), (String, Value)> {
    let schema = Value::Object((*tool.input_schema).clone());
    let props = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect();

    let valid_params: Vec<&str> = props.keys().map(String::as_str).collect();
    let mut violations: Vec<Value> = Vec::new();

    for k in args.keys() {
        if props.contains_key(k) {
            continue;
        }
        violations.push(json!({
            "type": "invalid-parameter",
            "parameter": k,
            "suggestions": find_similar_strings(k, &valid_params),
            "validParameters": valid_params,
        }));
    }

    for r in &required {
        if !args.contains_key(*r) {
            violations.push(json!({
                "type": "missing-required-parameter",
                "parameter": r,
            }));
        }
    }

    let instance = Value::Object(args.clone());
    match jsonschema::validator_for(&schema) {
        Ok(compiled) => {
            for e in compiled.iter_errors(&instance) {
                // Already reported above in a friendlier shape.
                if matches!(
                    e.kind(),
                    jsonschema::error::ValidationErrorKind::Required { .. }
                ) {
                    continue;
                }
                violations.push(json!({
                    "type": "constraint-violation",
                    "message": e.to_string(),
                    "instancePath": e.instance_path().to_string(),
                }));
            }
        }
        Err(e) => {
            tracing::warn!(tool = %tool.name, error = %e, "input schema does not compile; skipping type checks");
        }
    }

    if violations.is_empty() {
        return Ok(());
    }

    let msg = if let Some(v) = violations
        .iter()
        .find(|v| v.get("type").and_then(Value::as_str) == Some("invalid-parameter"))
    {
        let p = v.get("parameter").and_then(Value::as_str).unwrap_or("?");
        let suggestion = v
            .get("suggestions")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(Value::as_str);
        match suggestion {
            Some(s) => format!("Invalid params: unknown parameter '{p}' (did you mean '{s}'?)"),
            None => format!("Invalid params: unknown parameter '{p}'"),
        }
    } else if let [only] = violations.as_slice()
        && only.get("type").and_then(Value::as_str) == Some("missing-required-parameter")
    {
        let p = only.get("parameter").and_then(Value::as_str).unwrap_or("?");
        format!("Invalid params: missing required parameter '{p}'")
    } else {
        format!(
            "Invalid params: validation failed with {} error(s)",
            violations.len()
        )
    };

    Err((
        msg,
        json!({
            "type": "validation-errors",
            "violations": violations,
        }),
    ))
}

fn find_similar_strings(unknown: &str, known: &[&str]) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = known
        .iter()
        .map(|k| (strsim::jaro(unknown, k), (*k).to_string()))
        .filter(|(score, _)| *score > 0.7)
        .collect();
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
    candidates.into_iter().map(|(_, s)| s).collect()
}
