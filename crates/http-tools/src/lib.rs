//! HTTP plumbing shared by the YNAB tool surface.
//!
//! - [`client::AuthenticatedClient`]: the single bearer-authenticated client every tool call goes
//!   through.
//! - [`response_shaping`]: the response normalizer applied to every upstream response.
//! - [`semantics`]: MCP tool annotations derived from HTTP method semantics.

pub mod client;
pub mod error;
pub mod response_shaping;
pub mod semantics;

pub use client::{AuthenticatedClient, ClientConfig, PreparedRequest, QueryPair};
pub use error::{HttpToolsError, Result};
pub use response_shaping::{NormalizedBody, UpstreamError};
