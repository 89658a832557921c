//! The MCP server: generated YNAB tools plus the built-in `health` tool.

use crate::config::ServerConfig;
use crate::error::Result;
use crate::validation::{strip_null_arguments, validate_tool_arguments};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, Implementation, JsonObject, ListToolsResult,
    Meta, PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
    ToolAnnotations,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::json;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use ynab_http_tools::{AuthenticatedClient, ClientConfig, HttpToolsError, NormalizedBody};
use ynab_openapi_tools::{OpenApiToolSource, OpenApiToolsError, SpecDocument, fetch_spec};

pub const SERVER_NAME: &str = "YNAB MCP Server";
pub const HEALTH_TOOL_NAME: &str = "health";

const USER_AGENT: &str = concat!("ynab-mcp-server/", env!("CARGO_PKG_VERSION"));
const SYSTEM_TAG: &str = "system";

const INSTRUCTIONS: &str = "Tools for the YNAB (You Need A Budget) API, one per API operation. \
    Most tools take a budget_id; \"last-used\" selects the most recently used budget. \
    Currency amounts are in milliunits (1000 = 1.00).";

/// Fetch the spec and build the server.
///
/// The token is checked before anything touches the network.
///
/// # Errors
///
/// - [`crate::ServerError::Config`] if no access token is configured
/// - spec acquisition and format errors when the spec cannot be fetched and no cache is usable
/// - [`OpenApiToolsError::NameConflict`] if two exposed operations share a tool name
pub async fn create_server(config: &ServerConfig) -> Result<YnabMcpServer> {
    config.require_token()?;
    let spec = fetch_spec(&config.spec_url, config.timeout, config.cache_path.as_deref()).await?;
    YnabMcpServer::from_spec(config, &spec)
}

#[derive(Clone)]
pub struct YnabMcpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    source: OpenApiToolSource,
    /// Everything `tools/list` returns, in registry order; `health` comes last.
    tools: Vec<Tool>,
    index: HashMap<String, usize>,
    spec_url: String,
    health_enabled: bool,
}

impl std::fmt::Debug for YnabMcpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YnabMcpServer")
            .field("base_url", &self.base_url())
            .field("spec_url", &self.inner.spec_url)
            .field("tools", &self.inner.tools.len())
            .finish_non_exhaustive()
    }
}

impl YnabMcpServer {
    /// Build the server from an already loaded spec.
    ///
    /// # Errors
    ///
    /// See [`create_server`]; spec acquisition errors cannot occur here.
    pub fn from_spec(config: &ServerConfig, spec: &SpecDocument) -> Result<Self> {
        let token = config.require_token()?;
        let client = AuthenticatedClient::new(ClientConfig {
            base_url: config.base_url.clone(),
            token: token.to_string(),
            timeout: config.timeout,
            user_agent: USER_AGENT.to_string(),
        })?;

        let mut generation = config.tool_generation();
        if config.enable_health_routes {
            generation
                .reserved_names
                .insert(HEALTH_TOOL_NAME.to_string());
        }
        let source = OpenApiToolSource::build(spec, client, &generation)?;

        let mut tools = source.list_tools();
        if config.enable_health_routes {
            tools.push(health_tool());
        }
        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.to_string(), i))
            .collect();

        tracing::info!(
            tools = tools.len(),
            health = config.enable_health_routes,
            base_url = %config.base_url,
            "YNAB MCP server ready"
        );

        Ok(Self {
            inner: Arc::new(ServerInner {
                source,
                tools,
                index,
                spec_url: config.spec_url.clone(),
                health_enabled: config.enable_health_routes,
            }),
        })
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        SERVER_NAME
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.inner.source.client().base_url()
    }

    #[must_use]
    pub fn spec_url(&self) -> &str {
        &self.inner.spec_url
    }

    #[must_use]
    pub fn health_routes_enabled(&self) -> bool {
        self.inner.health_enabled
    }

    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.inner.tools
    }

    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.inner.index.get(name).map(|&i| &self.inner.tools[i])
    }

    /// Sorted union of the tags of every exposed tool.
    #[must_use]
    pub fn tags(&self) -> BTreeSet<String> {
        let mut tags: BTreeSet<String> = self
            .inner
            .source
            .tools()
            .iter()
            .flat_map(|t| t.tags.iter().cloned())
            .collect();
        if self.inner.health_enabled {
            tags.insert(SYSTEM_TAG.to_string());
        }
        tags
    }

    /// Invoke a tool by name.
    ///
    /// Upstream failures come back as a failed `CallToolResult` (`is_error = true`) carrying the
    /// composed error message; unknown tools and bad arguments are `invalid_params` errors.
    ///
    /// # Errors
    ///
    /// Returns an MCP error for unknown tools, invalid arguments, or internal failures.
    pub async fn call(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let tool = self
            .tool(name)
            .ok_or_else(|| McpError::invalid_params(format!("Tool not found: {name}"), None))?;

        let arguments = strip_null_arguments(arguments);
        validate_tool_arguments(tool, &arguments)
            .map_err(|(msg, data)| McpError::invalid_params(msg, Some(data)))?;

        if self.inner.health_enabled && name == HEALTH_TOOL_NAME {
            return Ok(CallToolResult::success(vec![Content::text(
                json!({"status": "ok"}).to_string(),
            )]));
        }

        match self.inner.source.call_tool(name, &arguments).await {
            Ok(body) => Ok(success_result(body)),
            Err(e) => failure_result(name, e),
        }
    }
}

fn success_result(body: NormalizedBody) -> CallToolResult {
    CallToolResult::success(vec![Content::text(body.text)])
}

fn failure_result(
    name: &str,
    err: OpenApiToolsError,
) -> std::result::Result<CallToolResult, McpError> {
    tracing::warn!(tool = %name, error = %err, "tool call failed");
    match err {
        OpenApiToolsError::InvalidArguments(msg) | OpenApiToolsError::Runtime(msg) => {
            Err(McpError::invalid_params(msg, None))
        }
        OpenApiToolsError::Http(HttpToolsError::Upstream(upstream)) => Ok(CallToolResult {
            content: vec![Content::text(upstream.message)],
            structured_content: Some(upstream.envelope),
            is_error: Some(true),
            meta: None,
        }),
        OpenApiToolsError::Http(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        other => Err(McpError::internal_error(other.to_string(), None)),
    }
}

fn health_tool() -> Tool {
    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), json!({}));

    let mut tool = Tool::new(
        HEALTH_TOOL_NAME,
        "Health check. Returns {\"status\": \"ok\"} when the server is running.",
        Arc::new(schema),
    );
    tool.annotations = Some(ToolAnnotations {
        title: Some("Health check".to_string()),
        read_only_hint: Some(true),
        destructive_hint: Some(false),
        idempotent_hint: Some(true),
        open_world_hint: Some(false),
    });

    let mut meta = JsonObject::new();
    meta.insert("tags".to_string(), json!([SYSTEM_TAG]));
    tool.meta = Some(Meta(meta));
    tool
}

impl ServerHandler for YnabMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("YNAB".to_string()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.inner.tools.clone()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.call(&request.name, request.arguments).await
    }
}
