use http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::node::WILDCARD;
use crate::error::SiestaError;
use crate::server::Handler;

/// Verbs recognised as operations under an OpenAPI path item.
const OPENAPI_VERBS: [&str; 8] = [
    "get", "put", "post", "delete", "options", "head", "patch", "trace",
];

/// One `(path, verb, handler)` triple of a routing table.
///
/// Route tables are plain data so they can live in YAML or JSON next to the
/// service config; handler names are resolved through a [`HandlerRegistry`]
/// when the [`Router`](super::Router) is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub path: String,
    pub verb: String,
    pub handler: String,
}

impl RouteEntry {
    pub fn new(
        path: impl Into<String>,
        verb: impl Into<String>,
        handler: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            verb: verb.into(),
            handler: handler.into(),
        }
    }

    /// The entry's verb as an HTTP method. Verbs are case-insensitive.
    ///
    /// # Errors
    ///
    /// `InvalidRoute` when the verb is not a valid method token.
    pub fn method(&self) -> Result<Method, SiestaError> {
        Method::from_bytes(self.verb.to_ascii_uppercase().as_bytes()).map_err(|_| {
            SiestaError::InvalidRoute(format!("{} {}: bad verb", self.verb, self.path))
        })
    }

    /// Derive route entries from an OpenAPI document.
    ///
    /// `{param}` segments become `*`, and each operation's `operationId` (or
    /// an `x-handler` extension) names its handler. The path of the first
    /// `servers` URL is used as a prefix. Operations without a handler name
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// `InvalidRoute` if the document has no `paths` object.
    pub fn from_openapi(doc: &Value) -> Result<Vec<RouteEntry>, SiestaError> {
        let paths = doc
            .get("paths")
            .and_then(Value::as_object)
            .ok_or_else(|| SiestaError::InvalidRoute("document has no paths object".into()))?;
        let base_path = openapi_base_path(doc);

        let mut entries = Vec::new();
        for (path, item) in paths {
            let Some(item) = item.as_object() else {
                continue;
            };
            let pattern = format!("{base_path}{}", wildcard_pattern(path));
            for verb in OPENAPI_VERBS {
                let Some(operation) = item.get(verb) else {
                    continue;
                };
                match handler_name(operation) {
                    Some(handler) => entries.push(RouteEntry::new(
                        pattern.clone(),
                        verb.to_ascii_uppercase(),
                        handler,
                    )),
                    None => warn!(
                        path = %path,
                        verb = verb,
                        "Skipping operation without operationId or x-handler"
                    ),
                }
            }
        }

        debug!(entries = entries.len(), base_path = %base_path, "OpenAPI routes extracted");
        Ok(entries)
    }
}

fn handler_name(operation: &Value) -> Option<String> {
    let operation = operation.as_object()?;
    operation
        .iter()
        .find_map(|(key, val)| {
            if key.starts_with("x-handler") {
                return val.as_str().map(str::to_string);
            }
            None
        })
        .or_else(|| {
            operation
                .get("operationId")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
}

/// `/pets/{id}/photos` -> `/pets/*/photos`
fn wildcard_pattern(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                WILDCARD
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn openapi_base_path(doc: &Value) -> String {
    let Some(server_url) = doc
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|servers| servers.first())
        .and_then(|server| server.get("url"))
        .and_then(Value::as_str)
    else {
        return String::new();
    };

    url::Url::parse(server_url)
        .or_else(|_| url::Url::parse(&format!("http://localhost{server_url}")))
        .map(|u| {
            let p = u.path().trim_end_matches('/');
            if p == "/" || p.is_empty() {
                String::new()
            } else {
                p.to_string()
            }
        })
        .unwrap_or_default()
}

/// Handlers addressable by name from a route table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &names)
            .finish()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`, replacing any previous registration.
    pub fn register<H>(&mut self, name: impl Into<String>, handler: H)
    where
        H: Handler,
    {
        self.register_arc(name, Arc::new(handler));
    }

    pub fn register_arc(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            warn!(
                handler_name = %name,
                total_handlers = self.handlers.len(),
                "Replaced existing handler"
            );
        } else {
            info!(
                handler_name = %name,
                total_handlers = self.handlers.len(),
                "Handler registered successfully"
            );
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wildcard_pattern() {
        assert_eq!(wildcard_pattern("/pets/{id}"), "/pets/*");
        assert_eq!(wildcard_pattern("/a/{x}/b/{y}"), "/a/*/b/*");
        assert_eq!(wildcard_pattern("/plain"), "/plain");
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(RouteEntry::new("/", "get", "h").method().unwrap(), Method::GET);
        assert_eq!(RouteEntry::new("/", "PATCH", "h").method().unwrap(), Method::PATCH);
        assert!(matches!(
            RouteEntry::new("/", "not a verb", "h").method(),
            Err(SiestaError::InvalidRoute(_))
        ));
    }

    #[test]
    fn test_from_openapi() {
        let doc = json!({
            "openapi": "3.1.0",
            "servers": [{ "url": "https://api.example.com/v4" }],
            "paths": {
                "/pets/{id}": {
                    "get": { "operationId": "get_pet" },
                    "delete": { "x-handler-delete": "remove_pet" },
                    "parameters": []
                },
                "/ping": {
                    "get": { "summary": "no handler name" }
                }
            }
        });

        let mut entries = RouteEntry::from_openapi(&doc).unwrap();
        entries.sort_by(|a, b| a.verb.cmp(&b.verb));
        assert_eq!(
            entries,
            vec![
                RouteEntry::new("/v4/pets/*", "DELETE", "remove_pet"),
                RouteEntry::new("/v4/pets/*", "GET", "get_pet"),
            ]
        );
    }

    #[test]
    fn test_from_openapi_relative_server() {
        let doc = json!({
            "servers": [{ "url": "/api/" }],
            "paths": { "/status": { "get": { "operationId": "status" } } }
        });
        let entries = RouteEntry::from_openapi(&doc).unwrap();
        assert_eq!(entries, vec![RouteEntry::new("/api/status", "GET", "status")]);
    }

    #[test]
    fn test_from_openapi_without_paths() {
        assert!(RouteEntry::from_openapi(&json!({ "openapi": "3.1.0" })).is_err());
    }

    #[test]
    fn test_route_entries_from_yaml() {
        let yaml = "- path: /v1/echo\n  verb: GET\n  handler: echo\n";
        let entries: Vec<RouteEntry> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(entries, vec![RouteEntry::new("/v1/echo", "GET", "echo")]);
    }
}
