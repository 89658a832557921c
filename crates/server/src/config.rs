//! Server configuration and command-line interface.
//!
//! [`ServerConfig`] is the explicit configuration passed to [`crate::create_server`]; nothing here
//! reads or mutates the process environment except the clap `env` fallbacks on [`Cli`].

use crate::error::{Result, ServerError};
use clap::{Parser, ValueEnum};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ynab_openapi_tools::loader::SPEC_CACHE_ENV;
use ynab_openapi_tools::{
    DEFAULT_SPEC_URL, RouteRule, ToolGenerationConfig, default_cache_path, parse_tags,
};

pub const DEFAULT_BASE_URL: &str = "https://api.ynab.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone)]
pub struct ServerConfig {
    /// YNAB personal access token. Required; `None` or blank fails server construction.
    pub token: Option<String>,
    pub spec_url: String,
    pub base_url: String,
    /// Per-call timeout for upstream requests and the spec fetch.
    pub timeout: Duration,
    pub include_tags: Option<BTreeSet<String>>,
    pub exclude_tags: Option<BTreeSet<String>>,
    /// Replaces the tag-derived rule list when non-empty.
    pub route_rules: Option<Vec<RouteRule>>,
    /// Registers the `health` tool and, over HTTP, the `/health` and `/debug` routes.
    pub enable_health_routes: bool,
    pub cache_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            token: None,
            spec_url: DEFAULT_SPEC_URL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            include_tags: None,
            exclude_tags: None,
            route_rules: None,
            enable_health_routes: true,
            cache_path: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("spec_url", &self.spec_url)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("include_tags", &self.include_tags)
            .field("exclude_tags", &self.exclude_tags)
            .field("route_rules", &self.route_rules)
            .field("enable_health_routes", &self.enable_health_routes)
            .field("cache_path", &self.cache_path)
            .finish()
    }
}

impl ServerConfig {
    /// The configured token, trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if no token is configured or it is blank.
    pub fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                ServerError::Config(
                    "YNAB access token is required (set YNAB_ACCESS_TOKEN or pass --token)"
                        .to_string(),
                )
            })
    }

    #[must_use]
    pub fn tool_generation(&self) -> ToolGenerationConfig {
        ToolGenerationConfig {
            include_tags: self.include_tags.clone(),
            exclude_tags: self.exclude_tags.clone(),
            route_rules: self.route_rules.clone(),
            reserved_names: BTreeSet::new(),
        }
    }
}

/// Load an override rule list from a YAML or JSON file.
///
/// ```yaml
/// - selector: { tags: [Deprecated] }
///   verdict: exclude
/// - selector: { operation: "DELETE *" }
///   verdict: exclude
/// - selector: any
///   verdict: tool
/// ```
///
/// # Errors
///
/// Returns [`ServerError::RouteRules`] if the file cannot be read or parsed.
pub fn load_route_rules(path: &Path) -> Result<Vec<RouteRule>> {
    let rules_err = |message: String| ServerError::RouteRules {
        path: path.display().to_string(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| rules_err(e.to_string()))?;
    // YAML is a superset of JSON, so one parser covers both.
    serde_yaml::from_str(&text).map_err(|e| rules_err(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    Stdio,
    Http,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// YNAB MCP server: every YNAB API operation as an MCP tool.
#[derive(Debug, Parser)]
#[command(name = "ynab-mcp-server", version, about)]
pub struct Cli {
    /// YNAB personal access token
    #[arg(long, env = "YNAB_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// URL of the YNAB OpenAPI spec
    #[arg(long, env = "YNAB_OPENAPI_SPEC_URL", default_value = DEFAULT_SPEC_URL)]
    pub spec_url: String,

    /// YNAB API base URL
    #[arg(long, env = "YNAB_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = DEFAULT_TIMEOUT.as_secs(),
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Only expose operations carrying one of these tags (comma separated)
    #[arg(long, env = "INCLUDE_TAGS", value_name = "TAGS")]
    pub include_tags: Option<String>,

    /// Hide operations carrying any of these tags (comma separated)
    #[arg(long, env = "EXCLUDE_TAGS", value_name = "TAGS")]
    pub exclude_tags: Option<String>,

    /// YAML/JSON file with an explicit route rule list; replaces the tag filters
    #[arg(long, value_name = "FILE")]
    pub route_rules: Option<PathBuf>,

    /// Do not register the health tool or the /health and /debug routes
    #[arg(long)]
    pub no_health_routes: bool,

    /// Where to cache the fetched spec
    #[arg(long, env = SPEC_CACHE_ENV, value_name = "PATH")]
    pub spec_cache: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Bind address for the HTTP transport
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port for the HTTP transport
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Print the exposed tool names and exit
    #[arg(long, conflicts_with_all = ["list_tags", "tool_schema"])]
    pub list_tools: bool,

    /// Print the tags of the exposed tools and exit
    #[arg(long, conflicts_with = "tool_schema")]
    pub list_tags: bool,

    /// Print one tool's input schema and exit
    #[arg(long, value_name = "NAME")]
    pub tool_schema: Option<String>,
}

impl Cli {
    /// Build the server configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::RouteRules`] if `--route-rules` points at an unreadable or invalid
    /// file.
    pub fn server_config(&self) -> Result<ServerConfig> {
        let route_rules = self
            .route_rules
            .as_deref()
            .map(load_route_rules)
            .transpose()?;

        Ok(ServerConfig {
            token: self.token.clone(),
            spec_url: self.spec_url.clone(),
            base_url: self.base_url.clone(),
            timeout: Duration::from_secs(self.timeout),
            include_tags: self.include_tags.as_deref().and_then(parse_tags),
            exclude_tags: self.exclude_tags.as_deref().and_then(parse_tags),
            route_rules,
            enable_health_routes: !self.no_health_routes,
            cache_path: self.spec_cache.clone().or_else(default_cache_path),
        })
    }
}
