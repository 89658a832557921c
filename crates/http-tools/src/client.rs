//! The authenticated YNAB client.
//!
//! One [`AuthenticatedClient`] is built per server and shared by every tool. It owns the bearer
//! token, the default headers and the per-call timeout, and runs every response through
//! [`crate::response_shaping::normalize_response`]. Nothing in it changes after construction, so
//! clones are cheap handles onto the same connection pool.

use crate::error::{HttpToolsError, Result};
use crate::response_shaping::{NormalizedBody, normalize_response};
use reqwest::Method;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPair {
    pub key: String,
    pub value: String,
}

impl QueryPair {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A fully-resolved upstream call: path parameters are already substituted.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Path relative to the client's base URL, starting with `/`.
    pub path: String,
    pub query: Vec<QueryPair>,
    pub headers: Vec<(String, String)>,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
}

impl PreparedRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }
}

#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The token lives inside the reqwest client's default headers and is never printed.
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.inner.base_url)
            .field("timeout", &self.inner.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedClient {
    /// Build the shared client.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the base URL is not an absolute URL, if the token is
    /// blank or not a valid header value, or if the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| {
            HttpToolsError::Config(format!("invalid base URL '{}': {e}", config.base_url))
        })?;

        let token = config.token.trim();
        if token.is_empty() {
            return Err(HttpToolsError::Config(
                "access token must not be empty".to_string(),
            ));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            HttpToolsError::Config(
                "access token contains characters that are not allowed in an HTTP header"
                    .to_string(),
            )
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| HttpToolsError::Config(sanitize_reqwest_error(&e)))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                client,
                base_url: config.base_url,
                timeout: config.timeout,
            }),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Join `path` onto the base URL and append the query pairs.
    ///
    /// The path is appended as-is; callers substitute path parameters before this point.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the joined URL does not parse.
    pub fn build_url(&self, path: &str, query: &[QueryPair]) -> Result<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.inner.base_url.trim_end_matches('/'), path)
        } else {
            format!("{}/{}", self.inner.base_url.trim_end_matches('/'), path)
        };
        let mut url = Url::parse(&joined)
            .map_err(|e| HttpToolsError::Config(format!("invalid request URL '{joined}': {e}")))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for p in query {
                pairs.append_pair(&p.key, &p.value);
            }
        }

        Ok(url)
    }

    /// Issue `request` and return its normalized body.
    ///
    /// # Errors
    ///
    /// - [`HttpToolsError::Timeout`] / [`HttpToolsError::Transport`] when the call itself fails
    /// - [`HttpToolsError::Upstream`] for non-2xx responses
    /// - [`HttpToolsError::Normalization`] if the body cannot be normalized
    pub async fn execute(&self, request: PreparedRequest) -> Result<NormalizedBody> {
        let url = self.build_url(&request.path, &request.query)?;
        tracing::debug!(method = %request.method, url = %redact_url(&url), "calling YNAB API");

        let mut builder = self.inner.client.request(request.method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;

        let normalized = normalize_response(status, &headers, &bytes);
        if let Err(HttpToolsError::Upstream(e)) = &normalized {
            tracing::warn!(status = e.status, "YNAB API returned an error response");
        }
        normalized
    }
}

/// Render a URL for logs: credentials, query and fragment are dropped.
#[must_use]
pub fn redact_url(url: &Url) -> String {
    let mut u = url.clone();
    let _ = u.set_username("");
    let _ = u.set_password(None);
    u.set_query(None);
    u.set_fragment(None);
    u.to_string()
}

#[must_use]
pub fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut msg = e.to_string();
    if let Some(u) = e.url() {
        msg = msg.replace(u.as_str(), &redact_url(u));
    }
    msg
}
