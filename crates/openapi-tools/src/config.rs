//! Tool generation configuration.

use crate::routes::{RouteRule, build_route_rules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Controls which operations become tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolGenerationConfig {
    /// Only operations carrying one of these tags are exposed.
    #[serde(default)]
    pub include_tags: Option<BTreeSet<String>>,

    /// Operations carrying any of these tags are hidden. Wins over `include_tags`.
    #[serde(default)]
    pub exclude_tags: Option<BTreeSet<String>>,

    /// Explicit rule list. When non-empty, both tag sets are ignored.
    #[serde(default)]
    pub route_rules: Option<Vec<RouteRule>>,

    /// Names registered by the caller itself (e.g. `health`). A generated tool resolving to one of
    /// these is a naming conflict.
    #[serde(default)]
    pub reserved_names: BTreeSet<String>,
}

impl ToolGenerationConfig {
    /// The effective rule list; `None` means every operation is a tool.
    #[must_use]
    pub fn rules(&self) -> Option<Vec<RouteRule>> {
        build_route_rules(
            self.include_tags.as_ref(),
            self.exclude_tags.as_ref(),
            self.route_rules.as_deref(),
        )
    }
}
