use anyhow::Context as _;
use clap::Parser as _;
use rmcp::ServiceExt as _;
use serde_json::Value;
use std::collections::BTreeMap;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use ynab_mcp_server::{Cli, LogFormat, Transport, YnabMcpServer, create_server};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = cli.server_config()?;
    let server = create_server(&config)
        .await
        .context("failed to build YNAB MCP server")?;

    if cli.list_tools {
        for tool in server.tools() {
            println!("{}", tool.name);
        }
        return Ok(ExitCode::SUCCESS);
    }
    if cli.list_tags {
        for tag in server.tags() {
            println!("{tag}");
        }
        return Ok(ExitCode::SUCCESS);
    }
    if let Some(name) = cli.tool_schema.as_deref() {
        return print_tool_schema(&server, name);
    }

    match cli.transport {
        Transport::Stdio => serve_stdio(server).await?,
        Transport::Http => serve_http(server, &cli.host, cli.port).await?,
    }
    Ok(ExitCode::SUCCESS)
}

/// Logs go to stderr: stdout belongs to the stdio transport.
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if let Err(err) = result {
        eprintln!("tracing init skipped: {err}");
    }
}

fn print_tool_schema(server: &YnabMcpServer, name: &str) -> anyhow::Result<ExitCode> {
    let Some(tool) = server.tool(name) else {
        eprintln!("Unknown tool '{name}'. Available tools:");
        for tool in server.tools() {
            eprintln!("  {}", tool.name);
        }
        return Ok(ExitCode::from(2));
    };

    let schema = sort_keys(Value::Object((*tool.input_schema).clone()));
    println!(
        "{}",
        serde_json::to_string_pretty(&schema).context("serialize input schema")?
    );
    Ok(ExitCode::SUCCESS)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

async fn serve_stdio(server: YnabMcpServer) -> anyhow::Result<()> {
    tracing::info!("Serving MCP over stdio");
    let service = server
        .serve(rmcp::transport::stdio())
        .await
        .context("start stdio transport")?;
    service.waiting().await.context("stdio transport")?;
    Ok(())
}

async fn serve_http(server: YnabMcpServer, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;

    ynab_mcp_server::http::serve(listener, server, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
    .context("serve HTTP transport")
}
