//! `OpenAPI` tool source: turns a loaded spec into a fixed table of invocable MCP tools.
//!
//! Construction is a single pass over the spec's operations:
//! 1. classify the operation against the route rules (excluded operations are skipped)
//! 2. resolve its tool name (rename table, then slugified `operationId`, then method + path)
//! 3. collect path/query/header/cookie parameters and the JSON request body into a flat argument
//!    list and derive the input schema from it
//!
//! Every tool is bound to the one shared [`AuthenticatedClient`]; the table is never mutated after
//! [`OpenApiToolSource::build`] returns.

use crate::config::ToolGenerationConfig;
use crate::error::{OpenApiToolsError, Result};
use crate::loader::{OperationRef, SpecDocument};
use crate::naming::{RenameTable, canonical_name, slugify};
use crate::resolver::RefResolver;
use crate::routes::{Verdict, classify};
use reqwest::Method;
use rmcp::model::{JsonObject, Meta, Tool};
use serde_json::{Map, Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use ynab_http_tools::semantics::annotations_for_method;
use ynab_http_tools::{AuthenticatedClient, NormalizedBody, PreparedRequest, QueryPair};

/// Name of the argument carrying a non-object request body.
const WHOLE_BODY_ARG: &str = "body";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    /// One property of a flattened JSON object body.
    BodyField,
    /// The entire (non-object) JSON body.
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryStyle {
    Form,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

#[derive(Debug, Clone, Copy)]
struct QuerySerialization {
    style: QueryStyle,
    explode: bool,
    allow_empty_value: bool,
}

#[derive(Debug, Clone)]
struct ToolParameter {
    /// Argument name; identical to the name on the wire.
    name: String,
    location: ParamLocation,
    required: bool,
    schema: Value,
    query: Option<QuerySerialization>,
}

/// One generated tool, bound to a single `(method, path)` operation.
#[derive(Debug, Clone)]
pub struct GeneratedTool {
    pub name: String,
    pub operation_id: Option<String>,
    pub description: String,
    /// The operation's `summary`, used as the annotation title.
    pub title: Option<String>,
    pub method: Method,
    pub path: String,
    pub tags: BTreeSet<String>,
    pub input_schema: Arc<JsonObject>,
    parameters: Vec<ToolParameter>,
    body_required: bool,
}

impl GeneratedTool {
    /// The MCP view of this tool.
    #[must_use]
    pub fn to_tool(&self) -> Tool {
        let mut tool = Tool::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        );
        tool.annotations = Some(annotations_for_method(&self.method, self.title.clone()));

        let mut meta = JsonObject::new();
        meta.insert("tags".to_string(), json!(self.tags));
        meta.insert("method".to_string(), json!(self.method.as_str()));
        meta.insert("path".to_string(), json!(self.path));
        if let Some(op_id) = &self.operation_id {
            meta.insert("operationId".to_string(), json!(op_id));
        }
        tool.meta = Some(Meta(meta));
        tool
    }

    fn has_flattened_body(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| p.location == ParamLocation::BodyField)
    }
}

/// The generated tool table plus the client every tool calls through.
#[derive(Debug, Clone)]
pub struct OpenApiToolSource {
    tools: Vec<GeneratedTool>,
    index: HashMap<String, usize>,
    client: AuthenticatedClient,
}

impl OpenApiToolSource {
    /// Generate tools for every exposed operation in `spec`.
    ///
    /// Operations that cannot be turned into a tool (unresolvable `$ref`, parameter collisions)
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::NameConflict`] if two exposed operations resolve to the same
    /// tool name, or one resolves to a reserved name.
    pub fn build(
        spec: &SpecDocument,
        client: AuthenticatedClient,
        config: &ToolGenerationConfig,
    ) -> Result<Self> {
        let renames = RenameTable::from_spec(spec);
        let rules = config.rules();
        let resolver = RefResolver::new(spec.root());

        let mut owners: HashMap<String, String> = config
            .reserved_names
            .iter()
            .map(|n| (n.clone(), "a built-in tool".to_string()))
            .collect();
        let mut tools: Vec<GeneratedTool> = Vec::new();

        for op in spec.operations() {
            let tags = op.tags();
            if classify(rules.as_deref(), op.method, op.path, &tags) == Verdict::Exclude {
                tracing::debug!(operation = %op.label(), "operation excluded by route rules");
                continue;
            }

            let name = tool_name(&renames, &op);
            if let Some(first) = owners.get(&name) {
                return Err(OpenApiToolsError::NameConflict {
                    name,
                    first: first.clone(),
                    second: op.label(),
                });
            }

            match generate_tool(&resolver, &op, name.clone(), tags) {
                Ok(tool) => {
                    owners.insert(name, op.label());
                    tools.push(tool);
                }
                Err(e) => {
                    tracing::warn!(
                        operation = %op.label(),
                        error = %e,
                        "Skipping operation: cannot generate tool"
                    );
                }
            }
        }

        tracing::info!(
            tools = tools.len(),
            renamed = renames.len(),
            filtered = rules.is_some(),
            "Generated tools from OpenAPI spec"
        );

        let index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Ok(Self {
            tools,
            index,
            client,
        })
    }

    #[must_use]
    pub fn tools(&self) -> &[GeneratedTool] {
        &self.tools
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&GeneratedTool> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    #[must_use]
    pub fn client(&self) -> &AuthenticatedClient {
        &self.client
    }

    /// List the MCP `Tool`s exposed by this source, in spec order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.tools.iter().map(GeneratedTool::to_tool).collect()
    }

    /// Turn tool arguments into an upstream request.
    ///
    /// Null-valued arguments count as absent.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::InvalidArguments`] if a required argument is missing, or if a
    /// path argument is empty or a dot segment.
    pub fn prepare_request(
        &self,
        tool: &GeneratedTool,
        arguments: &JsonObject,
    ) -> Result<PreparedRequest> {
        let mut path = tool.path.clone();
        let mut request = PreparedRequest::new(tool.method.clone(), String::new());
        let mut cookies: Vec<String> = Vec::new();
        let mut body_fields = Map::new();
        let mut whole_body: Option<Value> = None;

        for param in &tool.parameters {
            let Some(value) = arguments.get(&param.name).filter(|v| !v.is_null()) else {
                if param.required {
                    return Err(OpenApiToolsError::InvalidArguments(format!(
                        "Missing required parameter: {}",
                        param.name
                    )));
                }
                continue;
            };

            match param.location {
                ParamLocation::Path => {
                    let segment = encode_path_segment(&param.name, value)?;
                    path = path.replace(&format!("{{{}}}", param.name), &segment);
                }
                ParamLocation::Query => {
                    request
                        .query
                        .extend(serialize_query_param(param, value));
                }
                ParamLocation::Header => {
                    request
                        .headers
                        .push((param.name.clone(), value_to_string(value)));
                }
                ParamLocation::Cookie => {
                    cookies.push(format!("{}={}", param.name, value_to_string(value)));
                }
                ParamLocation::BodyField => {
                    body_fields.insert(param.name.clone(), value.clone());
                }
                ParamLocation::Body => whole_body = Some(value.clone()),
            }
        }

        if !cookies.is_empty() {
            request
                .headers
                .push(("Cookie".to_string(), cookies.join("; ")));
        }

        request.body = match whole_body {
            Some(body) => Some(body),
            None if !body_fields.is_empty()
                || (tool.body_required && tool.has_flattened_body()) =>
            {
                Some(Value::Object(body_fields))
            }
            None => None,
        };

        request.path = if path.starts_with('/') {
            path
        } else {
            format!("/{path}")
        };
        Ok(request)
    }

    /// Execute a tool call and return the normalized response body.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the tool name is unknown
    /// - required arguments are missing
    /// - the upstream call fails (transport, timeout or non-2xx response)
    pub async fn call_tool(&self, name: &str, arguments: &JsonObject) -> Result<NormalizedBody> {
        let tool = self
            .get(name)
            .ok_or_else(|| OpenApiToolsError::Runtime(format!("Tool not found: {name}")))?;
        let request = self.prepare_request(tool, arguments)?;
        Ok(self.client.execute(request).await?)
    }
}

fn tool_name(renames: &RenameTable, op: &OperationRef<'_>) -> String {
    op.operation_id()
        .and_then(|id| {
            let name = renames
                .get(id)
                .map_or_else(|| slugify(id), str::to_string);
            (!name.is_empty()).then_some(name)
        })
        .unwrap_or_else(|| canonical_name(op.method, op.path))
}

fn generate_tool(
    resolver: &RefResolver<'_>,
    op: &OperationRef<'_>,
    name: String,
    tags: BTreeSet<String>,
) -> Result<GeneratedTool> {
    let method = Method::from_bytes(op.method.to_uppercase().as_bytes())
        .map_err(|e| OpenApiToolsError::OpenApi(format!("Unsupported HTTP method: {e}")))?;

    let mut parameters = collect_parameters(resolver, op)?;
    let body_required = collect_body_parameters(resolver, op, &mut parameters)?;
    let input_schema = build_input_schema(&parameters);

    let description = op
        .description()
        .or_else(|| op.summary())
        .map_or_else(|| op.label(), str::to_string);

    Ok(GeneratedTool {
        name,
        operation_id: op.operation_id().map(str::to_string),
        description,
        title: op.summary().map(str::to_string),
        method,
        path: op.path.to_string(),
        tags,
        input_schema: Arc::new(input_schema),
        parameters,
        body_required,
    })
}

/// Path-item parameters overlaid with operation parameters, keyed by `(in, name)`.
fn collect_parameters(
    resolver: &RefResolver<'_>,
    op: &OperationRef<'_>,
) -> Result<Vec<ToolParameter>> {
    let declared = op
        .path_item
        .get("parameters")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .chain(
            op.operation
                .get("parameters")
                .and_then(Value::as_array)
                .into_iter()
                .flatten(),
        );

    let mut merged: Vec<ToolParameter> = Vec::new();
    for raw in declared {
        let param = extract_parameter(resolver, resolver.resolve(raw)?)?;
        if let Some(existing) = merged
            .iter_mut()
            .find(|p| p.location == param.location && p.name == param.name)
        {
            *existing = param;
        } else {
            if merged.iter().any(|p| p.name == param.name) {
                return Err(OpenApiToolsError::OpenApi(format!(
                    "Parameter '{}' appears in more than one location in {}",
                    param.name,
                    op.label()
                )));
            }
            merged.push(param);
        }
    }
    Ok(merged)
}

fn extract_parameter(resolver: &RefResolver<'_>, param: &Value) -> Result<ToolParameter> {
    let name = param
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| OpenApiToolsError::OpenApi("Parameter without a name".to_string()))?;
    let location = match param.get("in").and_then(Value::as_str) {
        Some("path") => ParamLocation::Path,
        Some("query") => ParamLocation::Query,
        Some("header") => ParamLocation::Header,
        Some("cookie") => ParamLocation::Cookie,
        other => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Parameter '{name}' has unsupported location {other:?}"
            )));
        }
    };

    // Path params are always required.
    let required = location == ParamLocation::Path
        || param.get("required").and_then(Value::as_bool) == Some(true);

    let raw_schema = param.get("schema").or_else(|| {
        param
            .get("content")
            .and_then(Value::as_object)
            .and_then(|c| c.values().next())
            .and_then(|media| media.get("schema"))
    });
    let mut schema = match raw_schema {
        Some(s) => resolver.schema_to_json(s)?,
        None => json!({"type": "string"}),
    };
    if let (Some(desc), Some(obj)) = (
        param.get("description").and_then(Value::as_str),
        schema.as_object_mut(),
    ) {
        obj.entry("description")
            .or_insert_with(|| Value::String(desc.to_string()));
    }

    let query = (location == ParamLocation::Query).then(|| {
        let style = match param.get("style").and_then(Value::as_str) {
            Some("spaceDelimited") => QueryStyle::SpaceDelimited,
            Some("pipeDelimited") => QueryStyle::PipeDelimited,
            Some("deepObject") => QueryStyle::DeepObject,
            _ => QueryStyle::Form,
        };
        let explode = param
            .get("explode")
            .and_then(Value::as_bool)
            .unwrap_or(matches!(style, QueryStyle::Form | QueryStyle::DeepObject));
        QuerySerialization {
            style,
            explode,
            allow_empty_value: param.get("allowEmptyValue").and_then(Value::as_bool)
                == Some(true),
        }
    });

    Ok(ToolParameter {
        name: name.to_string(),
        location,
        required,
        schema,
        query,
    })
}

/// Append request body arguments. Returns whether the body is required.
///
/// A JSON object body with declared properties is flattened into one argument per property;
/// anything else becomes a single `body` argument.
fn collect_body_parameters(
    resolver: &RefResolver<'_>,
    op: &OperationRef<'_>,
    parameters: &mut Vec<ToolParameter>,
) -> Result<bool> {
    let Some(raw_body) = op.operation.get("requestBody") else {
        return Ok(false);
    };
    let body = resolver.resolve(raw_body)?;
    let body_required = body.get("required").and_then(Value::as_bool) == Some(true);

    let Some(content) = body.get("content").and_then(Value::as_object) else {
        return Ok(body_required);
    };
    let media = content.get("application/json").or_else(|| {
        content
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase().contains("json"))
            .map(|(_, v)| v)
    });
    let Some(media) = media else {
        tracing::debug!(operation = %op.label(), "request body has no JSON media type; not exposed");
        return Ok(false);
    };

    let schema = match media.get("schema") {
        Some(s) => resolver.schema_to_json(s)?,
        None => json!({}),
    };

    let mut body_params: Vec<ToolParameter> = Vec::new();
    match schema.get("properties").and_then(Value::as_object) {
        Some(props) if !props.is_empty() => {
            let required_props: BTreeSet<&str> = schema
                .get("required")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
                .filter_map(Value::as_str)
                .collect();
            for (name, prop_schema) in props {
                body_params.push(ToolParameter {
                    name: name.clone(),
                    location: ParamLocation::BodyField,
                    required: body_required && required_props.contains(name.as_str()),
                    schema: prop_schema.clone(),
                    query: None,
                });
            }
        }
        _ => {
            let mut schema = schema.clone();
            if let (Some(desc), Some(obj)) = (
                body.get("description").and_then(Value::as_str),
                schema.as_object_mut(),
            ) {
                obj.entry("description")
                    .or_insert_with(|| Value::String(desc.to_string()));
            }
            body_params.push(ToolParameter {
                name: WHOLE_BODY_ARG.to_string(),
                location: ParamLocation::Body,
                required: body_required,
                schema,
                query: None,
            });
        }
    }

    for bp in &body_params {
        if parameters.iter().any(|p| p.name == bp.name) {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Body parameter '{}' collides with a path/query/header parameter in {}",
                bp.name,
                op.label()
            )));
        }
    }
    parameters.extend(body_params);
    Ok(body_required)
}

fn build_input_schema(parameters: &[ToolParameter]) -> JsonObject {
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    for param in parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    let mut schema = JsonObject::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema
}

fn serialize_query_param(param: &ToolParameter, value: &Value) -> Vec<QueryPair> {
    let ser = param.query.unwrap_or(QuerySerialization {
        style: QueryStyle::Form,
        explode: true,
        allow_empty_value: false,
    });
    let name = param.name.as_str();

    // An explicit empty string is sent as `key=`; empty collections only when the parameter
    // allows an empty value.
    if value.as_str() == Some("") {
        return vec![QueryPair::new(name, "")];
    }
    let is_empty = match value {
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    };
    if is_empty {
        return if ser.allow_empty_value || param.required {
            vec![QueryPair::new(name, "")]
        } else {
            Vec::new()
        };
    }

    match value {
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(value_to_string).collect();
            match ser.style {
                QueryStyle::Form if ser.explode => {
                    items.into_iter().map(|v| QueryPair::new(name, v)).collect()
                }
                QueryStyle::SpaceDelimited => vec![QueryPair::new(name, items.join(" "))],
                QueryStyle::PipeDelimited => vec![QueryPair::new(name, items.join("|"))],
                QueryStyle::Form | QueryStyle::DeepObject => {
                    vec![QueryPair::new(name, items.join(","))]
                }
            }
        }
        Value::Object(map) => match ser.style {
            QueryStyle::DeepObject => map
                .iter()
                .map(|(k, v)| QueryPair::new(format!("{name}[{k}]"), value_to_string(v)))
                .collect(),
            QueryStyle::Form if ser.explode => map
                .iter()
                .map(|(k, v)| QueryPair::new(k.clone(), value_to_string(v)))
                .collect(),
            QueryStyle::Form => {
                let flat: Vec<String> = map
                    .iter()
                    .flat_map(|(k, v)| [k.clone(), value_to_string(v)])
                    .collect();
                vec![QueryPair::new(name, flat.join(","))]
            }
            QueryStyle::SpaceDelimited | QueryStyle::PipeDelimited => {
                vec![QueryPair::new(name, value.to_string())]
            }
        },
        scalar => vec![QueryPair::new(name, value_to_string(scalar))],
    }
}

/// Encode a path argument as exactly one segment: everything outside the RFC 3986 unreserved set
/// is percent-encoded, so `/`, `?`, `#` and braces cannot reshape the request path.
///
/// Empty, `.` and `..` are rejected; URL parsing would collapse them even when encoded.
fn encode_path_segment(name: &str, value: &Value) -> Result<String> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let raw = value_to_string(value);
    if raw.is_empty() || raw == "." || raw == ".." {
        return Err(OpenApiToolsError::InvalidArguments(format!(
            "Invalid value for path parameter '{name}': {raw:?}"
        )));
    }

    let mut out = String::with_capacity(raw.len());
    for &b in raw.as_bytes() {
        if is_unreserved(b) {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(b >> 4)]));
            out.push(char::from(HEX[usize::from(b & 0x0F)]));
        }
    }
    Ok(out)
}

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

/// Render a JSON value for a URL or header. Booleans become `true`/`false`.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
