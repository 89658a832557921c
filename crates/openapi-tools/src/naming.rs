//! Tool naming.
//!
//! Tool names are snake_case versions of the spec's `operationId`s (`getBudgetById` ->
//! `get_budget_by_id`). The rename table records only the identifiers normalization actually
//! changes.

use crate::loader::SpecDocument;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// MCP clients commonly reject tool names longer than this.
pub const MAX_TOOL_NAME_LEN: usize = 64;

static UPPER_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex"));
static LOWER_UPPER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex"));
static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]+").expect("static regex"));
static UNDERSCORE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__+").expect("static regex"));
static PATH_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").expect("static regex"));

/// Normalize an identifier to lowercase snake_case.
///
/// Deterministic and idempotent: `snake_case(&snake_case(x)) == snake_case(x)`.
#[must_use]
pub fn snake_case(name: &str) -> String {
    let s = UPPER_WORD.replace_all(name, "${1}_${2}");
    let s = LOWER_UPPER.replace_all(&s, "${1}_${2}");
    let s = NON_WORD_RUN.replace_all(&s, "_");
    let s = UNDERSCORE_RUN.replace_all(&s, "_");
    s.trim_matches('_').to_lowercase()
}

/// Map of original `operationId` -> normalized tool name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameTable(BTreeMap<String, String>);

impl RenameTable {
    /// Build the table from every string `operationId` in the spec.
    ///
    /// No-op renames and identifiers that normalize to nothing are left out.
    #[must_use]
    pub fn from_spec(spec: &SpecDocument) -> Self {
        let mut names = BTreeMap::new();
        for op in spec.operations() {
            let Some(op_id) = op.operation_id() else {
                continue;
            };
            let snake = snake_case(op_id);
            if !snake.is_empty() && snake != op_id {
                names.insert(op_id.to_string(), snake);
            }
        }
        Self(names)
    }

    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&str> {
        self.0.get(operation_id).map(String::as_str)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Default name for an identifier the rename table does not cover: characters outside
/// `[A-Za-z0-9_]` become `_`, capped at [`MAX_TOOL_NAME_LEN`].
#[must_use]
pub fn slugify(identifier: &str) -> String {
    let slug = NON_WORD_RUN.replace_all(identifier, "_");
    cap_len(slug.trim_matches('_'))
}

/// Fallback name for operations without an `operationId`: `get /budgets/{budget_id}` ->
/// `get_budgets_budget_id`.
#[must_use]
pub fn canonical_name(method: &str, path: &str) -> String {
    let raw = format!("{}_{}", method.to_lowercase(), path);
    let raw = PATH_PARAM.replace_all(&raw, "_${1}");
    cap_len(&snake_case(&raw))
}

fn cap_len(name: &str) -> String {
    // Names are ASCII after normalization, but stay on a char boundary regardless.
    let mut end = name.len().min(MAX_TOOL_NAME_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].trim_end_matches('_').to_string()
}
