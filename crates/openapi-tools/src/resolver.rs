//! `$ref` resolution and schema conversion.
//!
//! Only document-local references (`#/components/...`) are supported; the YNAB spec is a single
//! self-contained file. References are resolved against the parsed JSON tree using JSON pointers.
//!
//! [`RefResolver::schema_to_json`] turns an `OpenAPI` 3.0 schema object into plain JSON Schema
//! suitable for an MCP tool's `inputSchema`: references are inlined, `nullable` becomes a type
//! union with `"null"`, and `example` becomes `examples`.

use crate::error::{OpenApiToolsError, Result};
use serde_json::{Map, Value, json};
use std::collections::HashSet;

/// Keywords that have no JSON Schema meaning and are dropped during conversion.
const OPENAPI_ONLY_KEYWORDS: [&str; 4] = ["xml", "externalDocs", "discriminator", "nullable"];

pub struct RefResolver<'a> {
    root: &'a Value,
}

impl<'a> RefResolver<'a> {
    #[must_use]
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    /// Follow a `$ref` chain until a non-reference value is reached.
    ///
    /// # Errors
    ///
    /// Returns an error for non-local or dangling references, and for reference cycles.
    pub fn resolve(&self, value: &'a Value) -> Result<&'a Value> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut cur = value;

        while let Some(reference) = ref_of(cur) {
            if !seen.insert(reference) {
                return Err(OpenApiToolsError::OpenApi(format!(
                    "Cyclic $ref detected while resolving: {reference}",
                )));
            }
            cur = self.lookup(reference)?;
        }

        Ok(cur)
    }

    fn lookup(&self, reference: &str) -> Result<&'a Value> {
        let Some(pointer) = reference.strip_prefix('#') else {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported external $ref '{reference}' (only '#/...' references are supported)",
            )));
        };
        if pointer.is_empty() {
            return Ok(self.root);
        }
        if !pointer.starts_with('/') {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
            )));
        }
        self.root.pointer(pointer).ok_or_else(|| {
            OpenApiToolsError::OpenApi(format!("Unresolved $ref '{reference}'"))
        })
    }

    /// Convert an `OpenAPI` schema object into self-contained JSON Schema.
    ///
    /// Recursive schemas are cut at the point of recursion with an unconstrained `{}`.
    ///
    /// # Errors
    ///
    /// Returns an error if a reference cannot be resolved.
    pub fn schema_to_json(&self, schema: &'a Value) -> Result<Value> {
        let mut stack: Vec<&'a str> = Vec::new();
        self.convert(schema, &mut stack)
    }

    fn convert(&self, schema: &'a Value, stack: &mut Vec<&'a str>) -> Result<Value> {
        if let Some(reference) = ref_of(schema) {
            if stack.contains(&reference) {
                return Ok(json!({}));
            }
            let target = self.lookup(reference)?;
            stack.push(reference);
            let out = self.convert(target, stack);
            stack.pop();
            return out;
        }

        let Some(obj) = schema.as_object() else {
            // `true`/`false` schemas and other oddities pass through.
            return Ok(schema.clone());
        };

        let mut out = Map::new();
        for (key, value) in obj {
            if OPENAPI_ONLY_KEYWORDS.contains(&key.as_str()) {
                continue;
            }
            let converted = match key.as_str() {
                "properties" | "patternProperties" => match value.as_object() {
                    Some(props) => {
                        let mut converted = Map::new();
                        for (name, prop) in props {
                            converted.insert(name.clone(), self.convert(prop, stack)?);
                        }
                        Value::Object(converted)
                    }
                    None => value.clone(),
                },
                "items" | "additionalProperties" | "not" if value.is_object() => {
                    self.convert(value, stack)?
                }
                "allOf" | "anyOf" | "oneOf" => match value.as_array() {
                    Some(items) => Value::Array(
                        items
                            .iter()
                            .map(|s| self.convert(s, stack))
                            .collect::<Result<_>>()?,
                    ),
                    None => value.clone(),
                },
                "example" => {
                    out.insert("examples".to_string(), json!([value]));
                    continue;
                }
                _ => value.clone(),
            };
            out.insert(key.clone(), converted);
        }

        if obj.get("nullable").and_then(Value::as_bool) == Some(true) {
            make_nullable(&mut out);
        }

        Ok(Value::Object(out))
    }
}

fn ref_of(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

fn make_nullable(schema: &mut Map<String, Value>) {
    if let Some(Value::String(t)) = schema.get("type").cloned() {
        schema.insert("type".to_string(), json!([t, "null"]));
    } else if let Some(Value::Array(types)) = schema.get_mut("type")
        && !types.iter().any(|t| t == "null")
    {
        types.push(json!("null"));
    }
    if let Some(Value::Array(values)) = schema.get_mut("enum")
        && !values.iter().any(Value::is_null)
    {
        values.push(Value::Null);
    }
}
