use thiserror::Error;
use ynab_http_tools::HttpToolsError;
use ynab_openapi_tools::OpenApiToolsError;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid or missing configuration. Raised before any network access.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to load route rules from '{path}': {message}")]
    RouteRules { path: String, message: String },

    #[error(transparent)]
    OpenApi(#[from] OpenApiToolsError),

    #[error(transparent)]
    Http(#[from] HttpToolsError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
