//! YNAB MCP server.
//!
//! Builds one MCP tool per operation in the YNAB `OpenAPI` spec (plus a `health` tool) and serves
//! them over stdio or streamable HTTP. Tool generation lives in `ynab-openapi-tools`; the HTTP
//! client and response normalization live in `ynab-http-tools`.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
pub mod validation;

pub use config::{Cli, LogFormat, ServerConfig, Transport};
pub use error::{Result, ServerError};
pub use server::{HEALTH_TOOL_NAME, SERVER_NAME, YnabMcpServer, create_server};
