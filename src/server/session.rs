use bytes::BytesMut;
use http::header::{ALLOW, CONNECTION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use serde_json::{json, Value};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::sink::{facility, ErrorSink};
use crate::codec;
use crate::config::ServerConfig;
use crate::error::{bounded, Phase, Result, SiestaError};
use crate::ids::{RequestId, SessionId, REQUEST_ID_HEADER};
use crate::router::Router;

/// One accepted connection.
///
/// The session is owned by the task serving it, so none of its state needs
/// a lock. It reads a request, dispatches it through the [`Router`], waits
/// for the handler to write the response and then reads the next request on
/// the same connection.
#[derive(Debug)]
pub struct ServerSession {
    id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    buf: BytesMut,
    response: Response<String>,
    request_id: RequestId,
    request_method: Method,
    written: bool,
    write_error: Option<SiestaError>,
    config: Arc<ServerConfig>,
}

/// How a single request ended when it did not end normally.
struct Teardown {
    error: SiestaError,
    facility: &'static str,
}

impl ServerSession {
    pub(crate) fn new(
        id: SessionId,
        stream: TcpStream,
        peer: SocketAddr,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            id,
            peer,
            stream,
            buf: BytesMut::with_capacity(4096),
            response: Response::new(String::new()),
            request_id: RequestId::new(),
            request_method: Method::GET,
            written: false,
            write_error: None,
            config,
        }
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Correlation id of the request being handled. Echoed back in the
    /// `x-request-id` response header.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The response for the current request. Starts as an empty `200 OK`.
    pub fn response_mut(&mut self) -> &mut Response<String> {
        &mut self.response
    }

    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Send the current response. Call once per request. The body is left
    /// off the wire when answering `HEAD`.
    ///
    /// # Errors
    ///
    /// `Timeout` or `Io` if the write fails; the session is torn down after
    /// the handler returns and the failure is reported as `on_write`.
    pub async fn write(&mut self) -> Result<()> {
        if self.written {
            return Err(SiestaError::Handler("response already written".into()));
        }
        self.written = true;

        let write =
            codec::write_response(&mut self.stream, &self.response, &self.request_method);
        match bounded(self.config.write_timeout(), Phase::Write, write).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let surfaced = echo_error(&err);
                self.write_error = Some(err);
                Err(surfaced)
            }
        }
    }

    /// Set a JSON body and status, then [`write`](Self::write).
    ///
    /// # Errors
    ///
    /// As [`write`](Self::write).
    pub async fn write_json(&mut self, status: StatusCode, body: &Value) -> Result<()> {
        *self.response.status_mut() = status;
        self.response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *self.response.body_mut() = body.to_string();
        self.write().await
    }

    /// Serve requests until the peer leaves or something fails.
    pub(crate) async fn run(mut self, router: Arc<Router>, sink: ErrorSink) {
        debug!(session_id = %self.id, peer = %self.peer, "Session started");
        let limits = self.config.limits();

        loop {
            let read = codec::read_request(&mut self.stream, &mut self.buf, &limits);
            let req = match bounded(self.config.read_timeout(), Phase::Read, read).await {
                Ok(req) => req,
                Err(err) if err.is_peer_closed() => {
                    debug!(session_id = %self.id, reason = %err, "Peer closed session");
                    break;
                }
                Err(err) => {
                    sink.report(&err, facility::ON_READ);
                    break;
                }
            };

            let close = codec::wants_close(req.version(), req.headers());
            let started = Instant::now();
            let method = req.method().clone();
            let path = req.uri().path().to_string();
            self.begin_response(&req, close);

            if let Err(teardown) = self.dispatch(&router, req).await {
                sink.report(&teardown.error, teardown.facility);
                break;
            }

            info!(
                session_id = %self.id,
                request_id = %self.request_id,
                method = %method,
                path = %path,
                status = self.response.status().as_u16(),
                latency_ms = started.elapsed().as_millis() as u64,
                "Request handled"
            );

            if close {
                break;
            }
        }

        if let Err(err) = self.stream.shutdown().await {
            debug!(session_id = %self.id, error = %err, "Socket shutdown failed");
        }
        debug!(session_id = %self.id, "Session finished");
    }

    fn begin_response(&mut self, req: &Request<String>, close: bool) {
        self.request_id = RequestId::from_header_or_new(
            req.headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        self.request_method = req.method().clone();
        self.written = false;
        self.write_error = None;

        let mut response = Response::new(String::new());
        *response.version_mut() = req.version();
        if let Ok(value) = HeaderValue::from_str(&self.request_id.to_string()) {
            response
                .headers_mut()
                .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
        }
        if close {
            response
                .headers_mut()
                .insert(CONNECTION, HeaderValue::from_static("close"));
        }
        self.response = response;
    }

    async fn dispatch(
        &mut self,
        router: &Router,
        mut req: Request<String>,
    ) -> std::result::Result<(), Teardown> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let Some(route) = router.lookup(&method, &path) else {
            let outcome = self.write_unrouted(router, &method, &path).await;
            return self.finish(outcome);
        };

        req.extensions_mut().insert(route.wildcards);
        let outcome = route.handler.handle(req, self).await;
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: Result<()>) -> std::result::Result<(), Teardown> {
        if let Some(error) = self.write_error.take() {
            return Err(Teardown {
                error,
                facility: facility::ON_WRITE,
            });
        }
        match outcome {
            Err(error) => Err(Teardown {
                error,
                facility: facility::HANDLE_REQUEST,
            }),
            Ok(()) if !self.written => Err(Teardown {
                error: SiestaError::ResponseNotWritten,
                facility: facility::HANDLE_REQUEST,
            }),
            Ok(()) => Ok(()),
        }
    }

    /// 404 when nothing is registered at `path`, 405 with `Allow` when the
    /// path exists under other verbs.
    async fn write_unrouted(&mut self, router: &Router, method: &Method, path: &str) -> Result<()> {
        let allowed = router.allowed_methods(path);
        if allowed.is_empty() {
            debug!(session_id = %self.id, method = %method, path = %path, "No route");
            return self
                .write_json(
                    StatusCode::NOT_FOUND,
                    &json!({ "error": "Not Found", "method": method.as_str(), "path": path }),
                )
                .await;
        }

        let allow = allowed
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if let Ok(value) = HeaderValue::from_str(&allow) {
            self.response.headers_mut().insert(ALLOW, value);
        }
        self.write_json(
            StatusCode::METHOD_NOT_ALLOWED,
            &json!({ "error": "Method Not Allowed", "method": method.as_str(), "path": path }),
        )
        .await
    }
}

/// A copy of a write failure for the handler; the original is kept for the
/// error sink.
fn echo_error(err: &SiestaError) -> SiestaError {
    match err {
        SiestaError::Timeout { phase } => SiestaError::Timeout { phase: *phase },
        SiestaError::Io(e) => SiestaError::Io(io::Error::new(e.kind(), e.to_string())),
        other => SiestaError::Handler(other.to_string()),
    }
}
