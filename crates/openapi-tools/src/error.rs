//! Error types for `ynab-openapi-tools`.

use thiserror::Error;
use ynab_http_tools::HttpToolsError;

/// Main error type for spec loading and tool generation.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read cached spec '{path}': {source}")]
    SpecReadCache {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("OpenAPI error: failed to parse spec from '{location}': {message}")]
    SpecParse { location: String, message: String },

    /// The document parsed, but its top level is not a mapping.
    #[error("OpenAPI error: spec from '{location}' is not a mapping")]
    SpecFormat { location: String },

    /// Two operations resolved to the same tool name.
    #[error("Tool name conflict: '{name}' is produced by both {first} and {second}")]
    NameConflict {
        name: String,
        first: String,
        second: String,
    },

    /// Operation could not be turned into a tool (bad `$ref`, parameter collision, ...).
    #[error("OpenAPI error: {0}")]
    OpenApi(String),

    /// Tool call rejected before any HTTP request was made.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Http(#[from] HttpToolsError),
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
