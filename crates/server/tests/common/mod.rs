#![allow(dead_code)]

use anyhow::Context as _;
use rmcp::model::{CallToolResult, JsonObject};
use serde_json::{Value, json};
use std::path::Path;
use std::process::{Child, Command};
use std::time::Duration;
use ynab_mcp_server::ServerConfig;
use ynab_test_support::{CannedResponse, MockUpstream, RecordedRequest};

pub use ynab_test_support::{KillOnDrop, pick_unused_port, wait_http_ok};

pub const TOKEN: &str = "test-token";
pub const SPEC_PATH: &str = "/open_api_spec.yaml";

/// A trimmed-down YNAB spec: same shapes, same quirks (bare integer response codes, shared
/// `budget_id` parameter, `$ref`'d request body).
pub const YNAB_SPEC: &str = r##"openapi: 3.0.0
info:
  title: YNAB API Endpoints
  version: 1.0.0
servers:
  - url: https://api.ynab.com/v1
paths:
  /user:
    get:
      tags: [User]
      summary: User info
      description: Returns authenticated user information
      operationId: getUser
      responses:
        200:
          description: The user info
  "/user/settings":
    get:
      tags: [User, internal]
      operationId: getUserSettings
      responses:
        200:
          description: Settings
  /budgets:
    get:
      tags: [Budgets]
      summary: List budgets
      operationId: getBudgets
      parameters:
        - name: include_accounts
          in: query
          description: Whether to include the list of budget accounts
          schema:
            type: boolean
      responses:
        200:
          description: The list of budgets
  "/budgets/{budget_id}":
    get:
      tags: [Budgets]
      summary: Single budget
      operationId: getBudgetById
      parameters:
        - $ref: "#/components/parameters/budget_id"
        - name: last_knowledge_of_server
          in: query
          schema:
            type: integer
            format: int64
      responses:
        200: {description: ok}
        404: {description: not found}
  "/budgets/{budget_id}/accounts":
    post:
      tags: [Accounts]
      summary: Create a new account
      operationId: createAccount
      parameters:
        - $ref: "#/components/parameters/budget_id"
      requestBody:
        required: true
        content:
          application/json:
            schema:
              $ref: "#/components/schemas/PostAccountWrapper"
      responses:
        201: {description: created}
  "/budgets/{budget_id}/months":
    get:
      tags: [Months]
      operationId: getBudgetMonths
      parameters:
        - $ref: "#/components/parameters/budget_id"
      responses:
        200: {description: ok}
  "/budgets/{budget_id}/transactions/{transaction_id}":
    delete:
      tags: [Transactions]
      operationId: deleteTransaction
      parameters:
        - $ref: "#/components/parameters/budget_id"
        - name: transaction_id
          in: path
          required: true
          schema: {type: string}
      responses:
        200: {description: ok}
components:
  parameters:
    budget_id:
      name: budget_id
      in: path
      required: true
      description: 'The id of the budget. "last-used" can be used to specify the last used budget.'
      schema:
        type: string
  schemas:
    PostAccountWrapper:
      type: object
      required: [account]
      properties:
        account:
          $ref: "#/components/schemas/SaveAccount"
    SaveAccount:
      type: object
      required: [name, type, balance]
      properties:
        name: {type: string}
        type: {$ref: "#/components/schemas/AccountType"}
        balance: {type: integer, format: int64}
    AccountType:
      type: string
      enum: [checking, savings, cash]
"##;

/// Every tool name [`YNAB_SPEC`] produces, plus `health`.
pub const ALL_TOOLS: [&str; 8] = [
    "create_account",
    "delete_transaction",
    "get_budget_by_id",
    "get_budget_months",
    "get_budgets",
    "get_user",
    "get_user_settings",
    "health",
];

fn respond(req: &RecordedRequest) -> CannedResponse {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", SPEC_PATH) => CannedResponse::text(200, YNAB_SPEC),
        ("GET", "/v1/user") => CannedResponse::json(
            200,
            &json!({"data": {"user": {"id": "u1", "note": null}}}),
        ),
        ("GET", "/v1/user/settings") => {
            CannedResponse::json(200, &json!({"data": {"settings": {}}}))
        }
        ("GET", "/v1/budgets") => CannedResponse::json(
            200,
            &json!({
                "data": {
                    "budgets": [{"id": "b1", "name": "Home", "accounts": null}],
                    "default_budget": null
                }
            }),
        ),
        ("GET", "/v1/budgets/last-used") => CannedResponse::json(200, &json!({"data": null})),
        ("POST", "/v1/budgets/b1/accounts") => CannedResponse::json(
            201,
            &json!({"data": {"account": {"id": "a1", "name": "Checking", "note": null}}}),
        ),
        ("GET", "/v1/budgets/b1/months") => CannedResponse::json(
            429,
            &json!({"error": {"id": "429", "name": "too_many_requests", "detail": "Too many requests"}}),
        )
        .with_header("retry-after", "30"),
        ("DELETE", p) if p.starts_with("/v1/budgets/b1/transactions/") => {
            CannedResponse::text(204, "")
        }
        ("GET", "/v1/budgets/missing") => CannedResponse::json(
            404,
            &json!({"error": {"id": "404", "name": "not_found", "detail": "missing"}}),
        ),
        _ => CannedResponse::json(
            404,
            &json!({"error": {"id": "404.2", "name": "resource_not_found", "detail": "Resource not found"}}),
        ),
    }
}

/// One mock host serving both the spec (at [`SPEC_PATH`]) and the API (under `/v1`).
pub async fn start_fake_ynab() -> anyhow::Result<MockUpstream> {
    MockUpstream::start(respond).await
}

pub fn server_config(upstream: &MockUpstream, cache_path: &Path) -> ServerConfig {
    ServerConfig {
        token: Some(TOKEN.to_string()),
        spec_url: upstream.url(SPEC_PATH),
        base_url: upstream.url("/v1"),
        timeout: Duration::from_secs(5),
        cache_path: Some(cache_path.to_path_buf()),
        ..Default::default()
    }
}

/// Requests the mock saw, minus spec fetches.
pub fn api_requests(upstream: &MockUpstream) -> Vec<RecordedRequest> {
    upstream
        .requests()
        .into_iter()
        .filter(|r| r.path != SPEC_PATH)
        .collect()
}

pub fn args(v: Value) -> Option<JsonObject> {
    v.as_object().cloned()
}

/// The single text block of a tool result.
pub fn result_text(result: &CallToolResult) -> anyhow::Result<String> {
    let content = result.content.first().context("tool result has no content")?;
    let text = content.as_text().context("tool result is not text")?;
    Ok(text.text.clone())
}

pub fn result_json(result: &CallToolResult) -> anyhow::Result<Value> {
    serde_json::from_str(&result_text(result)?).context("tool result text is not JSON")
}

pub fn spawn_server(upstream: &MockUpstream, cache_path: &Path, port: u16) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_ynab-mcp-server");
    Command::new(bin)
        .args(["--transport", "http", "--host", "127.0.0.1"])
        .arg("--port")
        .arg(port.to_string())
        .arg("--spec-url")
        .arg(upstream.url(SPEC_PATH))
        .arg("--base-url")
        .arg(upstream.url("/v1"))
        .arg("--spec-cache")
        .arg(cache_path)
        .env("YNAB_ACCESS_TOKEN", TOKEN)
        .env_remove("INCLUDE_TAGS")
        .env_remove("EXCLUDE_TAGS")
        .env("RUST_LOG", "warn")
        .spawn()
        .context("spawn ynab-mcp-server")
}
