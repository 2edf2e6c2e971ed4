use bytes::BytesMut;
use http::header::HOST;
use http::{HeaderValue, Request, Response};
use std::net::SocketAddr;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::ClientConfig;
use crate::error::{bounded, Phase, Result, SiestaError};

/// Where a [`ClientSession`] is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not started, stopped, `start` failed, or the last exchange lost the
    /// connection.
    Disconnected,
    /// Connected and ready for the next submission.
    Send,
    /// A submission is writing its request or waiting for the response.
    Receive,
    /// The response arrived; about to return to `Send`.
    Done,
}

/// A keep-alive HTTP/1.1 client connection carrying one request at a time.
///
/// `submit` takes `&mut self`, so overlapping submissions on one session do
/// not compile. If a submission's future is dropped mid-flight the session
/// is left in [`SessionState::Receive`] and every later `submit` fails with
/// [`SiestaError::SessionBusy`] until [`start`](Self::start) reconnects.
#[derive(Debug)]
pub struct ClientSession {
    config: ClientConfig,
    state: SessionState,
    stream: Option<TcpStream>,
    buf: BytesMut,
    host_header: Option<HeaderValue>,
    peer: Option<SocketAddr>,
}

impl ClientSession {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: SessionState::Disconnected,
            stream: None,
            buf: BytesMut::new(),
            host_header: None,
            peer: None,
        }
    }

    /// Resolve `host`, then connect to the resolved addresses in order.
    ///
    /// Any previous connection is dropped first. There is no retry: on
    /// failure the session stays disconnected and `submit` returns
    /// [`SiestaError::NotConnected`].
    ///
    /// # Errors
    ///
    /// `Resolve`/`NoAddress` or `Timeout { Resolve }` if resolution fails;
    /// the last `Connect`/`Timeout { Connect }` error if no address accepts.
    pub async fn start(&mut self, host: &str, port: u16) -> Result<()> {
        self.reset();

        let resolve = async {
            lookup_host((host, port))
                .await
                .map(|addrs| addrs.collect::<Vec<SocketAddr>>())
                .map_err(|source| SiestaError::Resolve {
                    host: host.to_string(),
                    source,
                })
        };
        let addrs = bounded(self.config.resolve_timeout(), Phase::Resolve, resolve).await?;
        if addrs.is_empty() {
            return Err(SiestaError::NoAddress(host.to_string()));
        }
        debug!(host = %host, port = port, addresses = addrs.len(), "Resolved");

        let authority = if port == 80 {
            host.to_string()
        } else {
            format!("{host}:{port}")
        };
        self.connect_any(&addrs, &authority).await
    }

    /// Connect straight to `addr`, skipping resolution.
    ///
    /// # Errors
    ///
    /// `Connect` or `Timeout { Connect }`.
    pub async fn start_addr(&mut self, addr: SocketAddr) -> Result<()> {
        self.reset();
        self.connect_any(&[addr], &addr.to_string()).await
    }

    async fn connect_any(&mut self, addrs: &[SocketAddr], authority: &str) -> Result<()> {
        let host_header = HeaderValue::from_str(authority)
            .map_err(|_| SiestaError::Protocol(format!("invalid host '{authority}'")))?;

        let mut last_error = None;
        for addr in addrs {
            let connect = async { TcpStream::connect(*addr).await.map_err(SiestaError::Connect) };
            match bounded(self.config.connect_timeout(), Phase::Connect, connect).await {
                Ok(stream) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(peer = %addr, error = %err, "Failed to set TCP_NODELAY");
                    }
                    self.stream = Some(stream);
                    self.peer = Some(*addr);
                    self.host_header = Some(host_header);
                    self.state = SessionState::Send;
                    info!(peer = %addr, "Client session connected");
                    return Ok(());
                }
                Err(err) => {
                    warn!(peer = %addr, error = %err, "Connect attempt failed");
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| SiestaError::NoAddress(authority.to_string())))
    }

    /// Send `req` and wait for its response.
    ///
    /// `Host` is filled in from the address given to `start` when missing;
    /// `Content-Length` always reflects the body.
    ///
    /// After a complete exchange, including one answered with a non-2xx
    /// status, the session returns to [`SessionState::Send`]. A transport
    /// failure leaves the connection at an unknown point in the response
    /// stream, so the socket is dropped and the session becomes
    /// [`SessionState::Disconnected`]. The same happens when the server
    /// signals that it will close the connection after this response.
    ///
    /// # Errors
    ///
    /// - `NotConnected` if the session was never started, `start` failed, or
    ///   an earlier exchange disconnected it.
    /// - `SessionBusy` if an earlier submission was abandoned mid-flight.
    /// - `Timeout`, `Io`, `EndOfStream` or `Protocol` for transport failures.
    /// - `Status { status, body }` for a response outside the 2xx class.
    pub async fn submit(&mut self, mut req: Request<String>) -> Result<Response<String>> {
        match self.state {
            SessionState::Send => {}
            SessionState::Disconnected => return Err(SiestaError::NotConnected),
            SessionState::Receive | SessionState::Done => return Err(SiestaError::SessionBusy),
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(SiestaError::NotConnected);
        };

        self.state = SessionState::Receive;
        if !req.headers().contains_key(HOST) {
            if let Some(host) = &self.host_header {
                req.headers_mut().insert(HOST, host.clone());
            }
        }
        debug!(method = %req.method(), uri = %req.uri(), "Submitting request");

        let limits = self.config.limits();
        let write = codec::write_request(stream, &req);
        let outcome = match bounded(self.config.write_timeout(), Phase::Write, write).await {
            Ok(()) => {
                let read = codec::read_response(stream, &mut self.buf, req.method(), &limits);
                bounded(self.config.read_timeout(), Phase::Read, read).await
            }
            Err(err) => Err(err),
        };
        self.state = SessionState::Done;

        let res = match outcome {
            Ok(res) => res,
            Err(err) => {
                warn!(error = %err, "Exchange failed, dropping connection");
                self.reset();
                return Err(err);
            }
        };

        let status = res.status();
        debug!(status = status.as_u16(), bytes = res.body().len(), "Response received");
        if codec::wants_close(res.version(), res.headers()) {
            debug!(status = status.as_u16(), "Server is closing the connection");
            self.reset();
        } else {
            self.state = SessionState::Send;
        }

        if status.is_success() {
            Ok(res)
        } else {
            Err(SiestaError::Status {
                status,
                body: res.into_body(),
            })
        }
    }

    /// `GET` `path_and_query` on this session.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit); `Protocol` if the target is not a valid
    /// URI.
    pub async fn get(&mut self, path_and_query: &str) -> Result<Response<String>> {
        let req = Request::get(path_and_query)
            .body(String::new())
            .map_err(|e| SiestaError::Protocol(e.to_string()))?;
        self.submit(req).await
    }

    /// Shut the connection down. The session can be started again.
    ///
    /// # Errors
    ///
    /// `Io` if the shutdown itself fails; the session is disconnected either
    /// way.
    pub async fn stop(&mut self) -> Result<()> {
        let stream = self.stream.take();
        self.reset();
        if let Some(mut stream) = stream {
            stream.shutdown().await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn reset(&mut self) {
        self.stream = None;
        self.peer = None;
        self.host_header = None;
        self.buf.clear();
        self.state = SessionState::Disconnected;
    }
}

impl Default for ClientSession {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_before_start() {
        let mut session = ClientSession::default();
        assert_eq!(session.state(), SessionState::Disconnected);
        let err = session.get("/").await.unwrap_err();
        assert!(matches!(err, SiestaError::NotConnected));
    }

    #[tokio::test]
    async fn test_failed_start_leaves_session_disconnected() {
        // Bind then drop to get a port nobody listens on.
        let addr = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let mut session = ClientSession::default();
        let err = session.start_addr(addr).await.unwrap_err();
        assert!(matches!(err, SiestaError::Connect(_) | SiestaError::Timeout { .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(matches!(session.get("/").await, Err(SiestaError::NotConnected)));
    }

    #[tokio::test]
    async fn test_unresolvable_host() {
        let mut session = ClientSession::default();
        let err = session.start("name.invalid", 80).await.unwrap_err();
        assert!(matches!(
            err,
            SiestaError::Resolve { .. } | SiestaError::NoAddress(_) | SiestaError::Timeout { .. }
        ));
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
