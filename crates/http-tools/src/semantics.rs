//! HTTP semantics helpers.
//!
//! YNAB operations are plain REST calls, so the MCP `ToolAnnotations` for a generated tool can be
//! read straight off its HTTP method (RFC 9110 safe/idempotent semantics).

use reqwest::Method;
use rmcp::model::ToolAnnotations;

/// Generate MCP tool annotations for an operation.
///
/// `openWorldHint` is always `true`: every generated tool talks to the YNAB API. Extension
/// methods only get `openWorldHint`; the remaining hints stay unset.
#[must_use]
pub fn annotations_for_method(method: &Method, title: Option<String>) -> ToolAnnotations {
    // (read_only, destructive, idempotent)
    let (read_only_hint, destructive_hint, idempotent_hint) = match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" => (Some(true), Some(false), Some(true)),
        "POST" => (Some(false), Some(false), Some(false)),
        "PUT" | "DELETE" => (Some(false), Some(true), Some(true)),
        // PATCH may or may not be idempotent.
        "PATCH" => (Some(false), Some(true), None),
        _ => (None, None, None),
    };

    ToolAnnotations {
        title,
        read_only_hint,
        destructive_hint,
        idempotent_hint,
        open_world_hint: Some(true),
    }
}
