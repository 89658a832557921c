//! Streamable-HTTP transport.
//!
//! MCP is served at `/mcp`. When health routes are enabled, two plain endpoints sit next to it and
//! bypass the tool path entirely: `GET /health` (text `OK`) and `GET /debug` (server name, base URL
//! and spec URL).

use crate::server::YnabMcpServer;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::StreamableHttpService;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use serde::Serialize;
use std::future::Future;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Serialize)]
struct DebugInfo {
    name: String,
    base_url: String,
    spec_url: String,
}

/// The full HTTP surface for `server`.
pub fn router(server: YnabMcpServer) -> Router {
    let aux = server.health_routes_enabled().then(|| {
        Router::new()
            .route("/health", get(health))
            .route("/debug", get(debug))
            .with_state(DebugInfo {
                name: server.name().to_string(),
                base_url: server.base_url().to_string(),
                spec_url: server.spec_url().to_string(),
            })
    });

    let service = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = Router::new().nest_service("/mcp", service);

    match aux {
        Some(aux) => router.merge(aux),
        None => router,
    }
}

/// Serve `server` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener fails while serving.
pub async fn serve(
    listener: TcpListener,
    server: YnabMcpServer,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("MCP server ready at http://{addr}/mcp");
    }
    axum::serve(listener, router(server))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health() -> &'static str {
    "OK"
}

async fn debug(State(info): State<DebugInfo>) -> Json<DebugInfo> {
    Json(info)
}
