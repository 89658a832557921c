//! Error types for `ynab-http-tools`.

use crate::response_shaping::UpstreamError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpToolsError {
    #[error("config error: {0}")]
    Config(String),

    /// Transport-level failure. The message has already been passed through
    /// [`crate::client::sanitize_reqwest_error`].
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// Non-2xx upstream response, already converted into the uniform error envelope.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("response normalization failed: {0}")]
    Normalization(String),
}

pub type Result<T> = std::result::Result<T, HttpToolsError>;

impl From<reqwest::Error> for HttpToolsError {
    fn from(value: reqwest::Error) -> Self {
        let message = crate::client::sanitize_reqwest_error(&value);
        if value.is_timeout() {
            Self::Timeout(message)
        } else {
            Self::Transport(message)
        }
    }
}
