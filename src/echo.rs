use futures::future::BoxFuture;
use http::{Method, Request, StatusCode};
use serde_json::json;

use crate::error::Result;
use crate::router::{HandlerRegistry, RouteEntry, WildcardSegments};
use crate::server::{Handler, ServerSession};

/// Path served by the demo echo service.
pub const ECHO_PATH: &str = "/v1/echo";

/// Echoes the `message` query parameter (or, for `POST`, the request body)
/// back as `{"message": ...}`.
///
/// Any wildcard captures are included as `"segments"` so the handler can be
/// mounted on patterns such as `/v1/echo/*`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl EchoHandler {
    fn message(req: &Request<String>) -> String {
        if req.method() == Method::POST && !req.body().is_empty() {
            return req.body().clone();
        }
        req.uri()
            .query()
            .and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == "message")
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_default()
    }
}

impl Handler for EchoHandler {
    fn handle<'a>(
        &'a self,
        req: Request<String>,
        session: &'a mut ServerSession,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let message = Self::message(&req);
            let mut body = json!({ "message": message });
            if let Some(segments) = req.extensions().get::<WildcardSegments>() {
                if !segments.is_empty() {
                    body["segments"] = json!(segments.0.as_slice());
                }
            }
            session.write_json(StatusCode::OK, &body).await
        })
    }
}

/// Route table for the demo service.
#[must_use]
pub fn echo_routes() -> Vec<RouteEntry> {
    vec![
        RouteEntry::new(ECHO_PATH, "GET", "echo"),
        RouteEntry::new(ECHO_PATH, "POST", "echo"),
        RouteEntry::new(format!("{ECHO_PATH}/*"), "GET", "echo"),
    ]
}

/// Registry holding the handlers named by [`echo_routes`].
#[must_use]
pub fn echo_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register("echo", EchoHandler);
    registry
}
