//! YNAB `OpenAPI` -> MCP tool generation.
//!
//! Loads the published spec (network first, local cache as fallback), decides which operations
//! are exposed, and turns each one into a named tool with a JSON Schema input and a request
//! builder bound to the shared authenticated client.
//!
//! It contains **no** MCP transport or server logic; see `ynab-mcp-server` for that.

pub mod config;
pub mod error;
pub mod loader;
pub mod naming;
pub mod resolver;
pub mod routes;
pub mod runtime;

pub use config::ToolGenerationConfig;
pub use error::{OpenApiToolsError, Result};
pub use loader::{DEFAULT_SPEC_URL, SpecDocument, SpecOrigin, default_cache_path, fetch_spec};
pub use naming::{RenameTable, snake_case};
pub use routes::{RouteRule, RouteSelector, Verdict, parse_tags};
pub use runtime::{GeneratedTool, OpenApiToolSource};
