//! Route classification: which operations become tools.
//!
//! Exposure is decided by an ordered rule list evaluated top to bottom, first match wins. The list
//! is normally derived from include/exclude tag sets by [`build_route_rules`]; callers can also
//! hand in their own list, which is then used verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Tool,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RouteSelector {
    /// Matches every operation.
    Any,
    /// Matches operations carrying all of these tags.
    Tags(BTreeSet<String>),
    /// Glob over `"METHOD /path"` (`*` any run, `?` one character), e.g. `"DELETE /budgets/*"`.
    Operation(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub selector: RouteSelector,
    pub verdict: Verdict,
}

impl RouteRule {
    #[must_use]
    pub fn new(selector: RouteSelector, verdict: Verdict) -> Self {
        Self { selector, verdict }
    }

    #[must_use]
    pub fn tag(tag: &str, verdict: Verdict) -> Self {
        Self::new(RouteSelector::Tags(BTreeSet::from([tag.to_string()])), verdict)
    }

    #[must_use]
    pub fn catch_all(verdict: Verdict) -> Self {
        Self::new(RouteSelector::Any, verdict)
    }

    #[must_use]
    pub fn matches(&self, method: &str, path: &str, tags: &BTreeSet<String>) -> bool {
        match &self.selector {
            RouteSelector::Any => true,
            RouteSelector::Tags(required) => required.is_subset(tags),
            RouteSelector::Operation(pattern) => {
                glob_match(pattern, &format!("{} {}", method.to_uppercase(), path))
            }
        }
    }
}

/// Build the rule list from tag configuration.
///
/// - a non-empty `overrides` list is returned as-is, ignoring both tag sets
/// - excluded tags come first (sorted), so exclusion beats inclusion
/// - with an include set: one TOOL rule per tag (sorted), then a catch-all EXCLUDE
/// - with only exclusions: a catch-all TOOL closes the list
/// - with neither: `None`, meaning every operation is a tool
///
/// Empty sets count as "not given".
#[must_use]
pub fn build_route_rules(
    include_tags: Option<&BTreeSet<String>>,
    exclude_tags: Option<&BTreeSet<String>>,
    overrides: Option<&[RouteRule]>,
) -> Option<Vec<RouteRule>> {
    if let Some(overrides) = overrides.filter(|o| !o.is_empty()) {
        return Some(overrides.to_vec());
    }

    let include_tags = include_tags.filter(|s| !s.is_empty());
    let exclude_tags = exclude_tags.filter(|s| !s.is_empty());

    let mut rules: Vec<RouteRule> = exclude_tags
        .into_iter()
        .flatten()
        .map(|tag| RouteRule::tag(tag, Verdict::Exclude))
        .collect();

    if let Some(include_tags) = include_tags {
        rules.extend(include_tags.iter().map(|tag| RouteRule::tag(tag, Verdict::Tool)));
        rules.push(RouteRule::catch_all(Verdict::Exclude));
        return Some(rules);
    }

    if rules.is_empty() {
        return None;
    }
    rules.push(RouteRule::catch_all(Verdict::Tool));
    Some(rules)
}

/// Evaluate `rules` for one operation. `None` rules, or no matching rule, means TOOL.
#[must_use]
pub fn classify(
    rules: Option<&[RouteRule]>,
    method: &str,
    path: &str,
    tags: &BTreeSet<String>,
) -> Verdict {
    rules
        .and_then(|rules| rules.iter().find(|r| r.matches(method, path, tags)))
        .map_or(Verdict::Tool, |r| r.verdict)
}

/// Parse a comma-separated tag list. Entries are trimmed, blanks dropped; an empty result is
/// `None`.
#[must_use]
pub fn parse_tags(value: &str) -> Option<BTreeSet<String>> {
    let tags: BTreeSet<String> = value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    (!tags.is_empty()).then_some(tags)
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    // Position of the last `*` and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                backtrack = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    pi = star + 1;
                    ti = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
