//! Spec loading.
//!
//! The spec is fetched over HTTP once at startup. A successful fetch is written through to a local
//! cache file (best effort); a failed fetch falls back to that cache when it exists. Parsing tries
//! strict JSON first and then YAML, and the result must be a mapping.

use crate::error::{OpenApiToolsError, Result};
use serde_json::{Map, Value};
use sha2::{Digest as _, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ynab_http_tools::client::sanitize_reqwest_error;

pub const DEFAULT_SPEC_URL: &str = "https://api.ynab.com/papi/open_api_spec.yaml";

/// Environment variable the CLI reads to override the cache location.
pub const SPEC_CACHE_ENV: &str = "YNAB_MCP_SPEC_CACHE";

const CACHE_DIR_NAME: &str = "ynab-mcp-server";
const CACHE_FILE_NAME: &str = "open_api_spec.yaml";

/// HTTP methods that can carry an operation under a path item.
const OPERATION_METHODS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecOrigin {
    Network,
    Cache,
    /// Built in-process (tests, embedding).
    Inline,
}

impl std::fmt::Display for SpecOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::Inline => "inline",
        })
    }
}

/// A parsed `OpenAPI` document. Read-only after load; the top level is always a mapping.
#[derive(Debug, Clone)]
pub struct SpecDocument {
    root: Value,
    origin: SpecOrigin,
    digest: String,
}

/// One `(path, method)` entry of the document.
#[derive(Debug, Clone, Copy)]
pub struct OperationRef<'a> {
    pub path: &'a str,
    /// Lowercase method key as it appears in the document.
    pub method: &'a str,
    pub operation: &'a Map<String, Value>,
    pub path_item: &'a Map<String, Value>,
}

impl OperationRef<'_> {
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation
            .get("operationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    #[must_use]
    pub fn tags(&self) -> BTreeSet<String> {
        self.operation
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        self.operation.get("summary").and_then(Value::as_str)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.operation.get("description").and_then(Value::as_str)
    }

    /// `"GET /budgets/{budget_id}"`, for logs and error messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), self.path)
    }
}

impl SpecDocument {
    /// Parse spec text: strict JSON first, then YAML.
    ///
    /// # Errors
    ///
    /// - [`OpenApiToolsError::SpecParse`] if the text is neither JSON nor YAML
    /// - [`OpenApiToolsError::SpecFormat`] if the parsed value is not a mapping
    pub fn from_text(text: &str, location: &str, origin: SpecOrigin) -> Result<Self> {
        let root = match serde_json::from_str::<Value>(text) {
            Ok(v) => v,
            Err(_) => {
                let yaml: serde_yaml::Value =
                    serde_yaml::from_str(text).map_err(|e| OpenApiToolsError::SpecParse {
                        location: location.to_string(),
                        message: e.to_string(),
                    })?;
                yaml_to_json(yaml).map_err(|message| OpenApiToolsError::SpecParse {
                    location: location.to_string(),
                    message,
                })?
            }
        };

        if !root.is_object() {
            return Err(OpenApiToolsError::SpecFormat {
                location: location.to_string(),
            });
        }

        Ok(Self {
            root,
            origin,
            digest: hex::encode(Sha256::digest(text.as_bytes())),
        })
    }

    /// Wrap an already-parsed document.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::SpecFormat`] if `root` is not a JSON object.
    pub fn from_value(root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(OpenApiToolsError::SpecFormat {
                location: "<inline>".to_string(),
            });
        }
        let digest = hex::encode(Sha256::digest(root.to_string().as_bytes()));
        Ok(Self {
            root,
            origin: SpecOrigin::Inline,
            digest,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Value {
        &self.root
    }

    #[must_use]
    pub fn origin(&self) -> SpecOrigin {
        self.origin
    }

    /// SHA-256 (hex) of the text the document was parsed from.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.root.pointer("/info/title").and_then(Value::as_str)
    }

    /// All operations in document order. A missing `paths` section yields nothing; path items
    /// and operations that are not mappings are skipped.
    #[must_use]
    pub fn operations(&self) -> Vec<OperationRef<'_>> {
        let Some(paths) = self.root.get("paths").and_then(Value::as_object) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for (path, item) in paths {
            let Some(path_item) = item.as_object() else {
                continue;
            };
            for (method, op) in path_item {
                if !OPERATION_METHODS.contains(&method.as_str()) {
                    continue;
                }
                let Some(operation) = op.as_object() else {
                    continue;
                };
                out.push(OperationRef {
                    path,
                    method,
                    operation,
                    path_item,
                });
            }
        }
        out
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> std::result::Result<Value, String> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(seq) => Value::Array(
            seq.into_iter()
                .map(yaml_to_json)
                .collect::<std::result::Result<_, _>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut out = Map::new();
            for (k, v) in mapping {
                // Response codes are often written as bare integers (`200:`).
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Null => "null".to_string(),
                    other => return Err(format!("unsupported mapping key: {other:?}")),
                };
                out.insert(key, yaml_to_json(v)?);
            }
            Value::Object(out)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// Resolve the cache file location.
///
/// An explicit path wins; otherwise `$XDG_CACHE_HOME` and then `$HOME/.cache` are used as the
/// base directory. `None` when nothing is set.
#[must_use]
pub fn cache_path_from(
    explicit: Option<PathBuf>,
    xdg_cache_home: Option<PathBuf>,
    home: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p);
    }
    let base = xdg_cache_home
        .filter(|p| !p.as_os_str().is_empty())
        .or_else(|| home.map(|h| h.join(".cache")))?;
    Some(base.join(CACHE_DIR_NAME).join(CACHE_FILE_NAME))
}

/// [`cache_path_from`] using the process environment.
#[must_use]
pub fn default_cache_path() -> Option<PathBuf> {
    cache_path_from(
        std::env::var_os(SPEC_CACHE_ENV).map(PathBuf::from),
        std::env::var_os("XDG_CACHE_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

/// Fetch and parse the spec, falling back to `cache_path` when the fetch fails.
///
/// # Errors
///
/// - the fetch error ([`OpenApiToolsError::SpecFetch`]) when the fetch fails and there is no cache
/// - [`OpenApiToolsError::SpecReadCache`] if the cache exists but cannot be read
/// - parse/format errors for whichever text was used
pub async fn fetch_spec(
    spec_url: &str,
    timeout: Duration,
    cache_path: Option<&Path>,
) -> Result<SpecDocument> {
    tracing::info!(url = %spec_url, "Fetching OpenAPI spec");

    let text = match fetch_text(spec_url, timeout).await {
        Ok(text) => text,
        Err(err) => {
            let Some(path) = cache_path else {
                return Err(err);
            };
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                return Err(err);
            }

            tracing::warn!(
                error = %err,
                path = %path.display(),
                "spec fetch failed; falling back to cached copy"
            );
            let text = tokio::fs::read_to_string(path).await.map_err(|source| {
                OpenApiToolsError::SpecReadCache {
                    path: path.display().to_string(),
                    source,
                }
            })?;
            let doc = SpecDocument::from_text(
                &text,
                &path.display().to_string(),
                SpecOrigin::Cache,
            )?;
            log_loaded(&doc);
            return Ok(doc);
        }
    };

    let doc = SpecDocument::from_text(&text, spec_url, SpecOrigin::Network)?;
    if let Some(path) = cache_path {
        write_cache(path, &text).await;
    }
    log_loaded(&doc);
    Ok(doc)
}

async fn fetch_text(spec_url: &str, timeout: Duration) -> Result<String> {
    let fetch_err = |e: &reqwest::Error| OpenApiToolsError::SpecFetch {
        url: spec_url.to_string(),
        message: sanitize_reqwest_error(e),
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| fetch_err(&e))?;
    let response = client
        .get(spec_url)
        .send()
        .await
        .map_err(|e| fetch_err(&e))?
        .error_for_status()
        .map_err(|e| fetch_err(&e))?;
    response.text().await.map_err(|e| fetch_err(&e))
}

/// Write-through cache. Failures are logged and otherwise ignored.
async fn write_cache(path: &Path, text: &str) {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        tracing::warn!(error = %e, path = %parent.display(), "failed to create spec cache directory");
        return;
    }
    if let Err(e) = tokio::fs::write(path, text).await {
        tracing::warn!(error = %e, path = %path.display(), "failed to write spec cache");
    }
}

fn log_loaded(doc: &SpecDocument) {
    tracing::info!(
        origin = %doc.origin(),
        sha256 = %doc.digest(),
        title = doc.title().unwrap_or("<untitled>"),
        operations = doc.operations().len(),
        "Loaded OpenAPI spec"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use ynab_test_support::{CannedResponse, MockUpstream, unreachable_url};

    const YAML_SPEC: &str = r"openapi: 3.0.0
info:
  title: YNAB API
  version: 1.0.0
paths:
  /user:
    get:
      operationId: getUser
      tags: [User]
      responses:
        200:
          description: ok
";

    #[test]
    fn parses_json_before_yaml() {
        let doc = SpecDocument::from_text(
            r#"{"openapi": "3.0.0", "paths": {}}"#,
            "mem",
            SpecOrigin::Inline,
        )
        .unwrap();
        assert_eq!(doc.root()["openapi"], "3.0.0");
    }

    #[test]
    fn yaml_integer_keys_become_strings() {
        let doc = SpecDocument::from_text(YAML_SPEC, "mem", SpecOrigin::Inline).unwrap();
        assert_eq!(
            doc.root().pointer("/paths/~1user/get/responses/200/description"),
            Some(&json!("ok"))
        );
        assert_eq!(doc.title(), Some("YNAB API"));
    }

    #[test]
    fn non_mapping_documents_are_format_errors() {
        for text in ["[1, 2, 3]", "- a\n- b\n", "\"just a string\"", "42"] {
            let err = SpecDocument::from_text(text, "mem", SpecOrigin::Inline).unwrap_err();
            assert!(
                matches!(err, OpenApiToolsError::SpecFormat { .. }),
                "{text}: {err:?}"
            );
        }
    }

    #[test]
    fn unparseable_text_is_a_parse_error() {
        let err = SpecDocument::from_text("key: [unclosed", "mem", SpecOrigin::Inline).unwrap_err();
        assert!(matches!(err, OpenApiToolsError::SpecParse { .. }), "{err:?}");
    }

    #[test]
    fn operations_skip_non_mappings_and_tolerate_missing_paths() {
        let empty = SpecDocument::from_value(json!({"openapi": "3.0.0"})).unwrap();
        assert!(empty.operations().is_empty());

        let doc = SpecDocument::from_value(json!({
            "paths": {
                "/a": "not a mapping",
                "/b": {
                    "parameters": [],
                    "get": {"operationId": "getB", "tags": ["B"]},
                    "post": "not a mapping",
                    "summary": "ignored"
                }
            }
        }))
        .unwrap();
        let ops = doc.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].path, "/b");
        assert_eq!(ops[0].method, "get");
        assert_eq!(ops[0].operation_id(), Some("getB"));
        assert_eq!(ops[0].tags(), BTreeSet::from(["B".to_string()]));
    }

    #[test]
    fn cache_path_resolution_order() {
        let explicit = PathBuf::from("/tmp/explicit.yaml");
        assert_eq!(
            cache_path_from(Some(explicit.clone()), Some("/xdg".into()), Some("/home/u".into())),
            Some(explicit)
        );
        assert_eq!(
            cache_path_from(None, Some("/xdg".into()), Some("/home/u".into())),
            Some(PathBuf::from("/xdg/ynab-mcp-server/open_api_spec.yaml"))
        );
        assert_eq!(
            cache_path_from(None, None, Some("/home/u".into())),
            Some(PathBuf::from("/home/u/.cache/ynab-mcp-server/open_api_spec.yaml"))
        );
        assert_eq!(cache_path_from(None, None, None), None);
    }

    #[tokio::test]
    async fn fetch_writes_cache_and_falls_back_to_it() {
        let upstream = MockUpstream::serving_text(YAML_SPEC).await.unwrap();
        let dir = tempdir().unwrap();
        let cache = dir.path().join("nested").join("open_api_spec.yaml");

        let fetched = fetch_spec(&upstream.url("/spec.yaml"), Duration::from_secs(5), Some(&cache))
            .await
            .unwrap();
        assert_eq!(fetched.origin(), SpecOrigin::Network);
        assert_eq!(std::fs::read_to_string(&cache).unwrap(), YAML_SPEC);

        let offline = unreachable_url("/spec.yaml").unwrap();
        let cached = fetch_spec(&offline, Duration::from_secs(5), Some(&cache))
            .await
            .unwrap();
        assert_eq!(cached.origin(), SpecOrigin::Cache);
        assert_eq!(cached.digest(), fetched.digest());
        assert_eq!(cached.root(), fetched.root());
    }

    #[tokio::test]
    async fn http_errors_fall_back_to_cache() {
        let upstream = MockUpstream::start(|_| CannedResponse::text(503, "maintenance"))
            .await
            .unwrap();
        let dir = tempdir().unwrap();
        let cache = dir.path().join("spec.yaml");
        std::fs::write(&cache, YAML_SPEC).unwrap();

        let doc = fetch_spec(&upstream.url("/spec.yaml"), Duration::from_secs(5), Some(&cache))
            .await
            .unwrap();
        assert_eq!(doc.origin(), SpecOrigin::Cache);
        assert_eq!(doc.operations().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_without_cache_propagates() {
        let dir = tempdir().unwrap();
        let missing_cache = dir.path().join("absent.yaml");
        let offline = unreachable_url("/spec.yaml").unwrap();

        let err = fetch_spec(&offline, Duration::from_secs(5), Some(&missing_cache))
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::SpecFetch { .. }), "{err:?}");

        let err = fetch_spec(&offline, Duration::from_secs(5), None)
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::SpecFetch { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn cache_write_failures_are_not_fatal() {
        let upstream = MockUpstream::serving_text(YAML_SPEC).await.unwrap();
        let dir = tempdir().unwrap();
        // A directory where the cache file should be: the write fails, the fetch does not.
        let doc = fetch_spec(&upstream.url("/spec.yaml"), Duration::from_secs(5), Some(dir.path()))
            .await
            .unwrap();
        assert_eq!(doc.origin(), SpecOrigin::Network);
    }
}
