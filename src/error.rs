//! Error type shared by the sync primitives, the HTTP sessions and the router.
//!
//! Every asynchronous failure is delivered through the operation's own
//! `Result`; nothing is thrown across an `.await`. Transport failures,
//! non-2xx HTTP statuses, resource exhaustion and caller contract violations
//! all flow through [`SiestaError`] so callers have a single failure channel.

use http::StatusCode;
use std::future::Future;
use std::io;
use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T, E = SiestaError> = std::result::Result<T, E>;

/// Phase of an I/O operation that hit its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Resolve,
    Connect,
    Read,
    Write,
    Wait,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Resolve => "resolve",
            Phase::Connect => "connect",
            Phase::Read => "read",
            Phase::Write => "write",
            Phase::Wait => "wait",
        };
        f.write_str(name)
    }
}

/// Run `fut` under an optional deadline; expiry becomes
/// [`SiestaError::Timeout`] for `phase`.
pub(crate) async fn bounded<F, T>(limit: Option<Duration>, phase: Phase, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SiestaError::Timeout { phase })?,
        None => fut.await,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SiestaError {
    // -- transport --------------------------------------------------------
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("no address resolved for {0}")]
    NoAddress(String),

    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("{phase} timed out")]
    Timeout { phase: Phase },

    /// The peer closed the stream cleanly before a new message started.
    #[error("end of stream")]
    EndOfStream,

    #[error("malformed http message: {0}")]
    Protocol(String),

    #[error("session is not connected")]
    NotConnected,

    // -- protocol ---------------------------------------------------------
    /// A response arrived with a status outside the 2xx class.
    #[error("http status {status}")]
    Status { status: StatusCode, body: String },

    // -- resources --------------------------------------------------------
    #[error("insufficient resources")]
    ResourceExhausted,

    // -- usage ------------------------------------------------------------
    #[error("a request is already in flight on this session")]
    SessionBusy,

    #[error("semaphore released beyond its maximum of {max}")]
    SemaphoreOverflow { max: usize },

    #[error("initial permit count {requested} exceeds maximum {max}")]
    InvalidInitialPermits { requested: usize, max: usize },

    // -- server -----------------------------------------------------------
    #[error("handler returned without writing a response")]
    ResponseNotWritten,

    #[error("route table references unknown handler '{0}'")]
    UnknownHandler(String),

    #[error("invalid route: {0}")]
    InvalidRoute(String),

    #[error("handler failed: {0}")]
    Handler(String),
}

impl SiestaError {
    /// The numeric status carried by a protocol-level failure.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SiestaError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, SiestaError::Timeout { .. })
    }

    /// True when the peer ended the connection rather than something failing
    /// on our side. Server sessions terminate quietly on these.
    #[must_use]
    pub fn is_peer_closed(&self) -> bool {
        match self {
            SiestaError::EndOfStream => true,
            SiestaError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_accessor() {
        let err = SiestaError::Status {
            status: StatusCode::NOT_FOUND,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.to_string(), "http status 404 Not Found");
        assert_eq!(SiestaError::ResourceExhausted.status(), None);
    }

    #[test]
    fn test_peer_closed_classification() {
        assert!(SiestaError::EndOfStream.is_peer_closed());
        assert!(SiestaError::Io(io::Error::from(io::ErrorKind::ConnectionReset)).is_peer_closed());
        assert!(!SiestaError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_peer_closed());
        assert!(!SiestaError::Timeout { phase: Phase::Read }.is_peer_closed());
    }

    #[tokio::test]
    async fn test_bounded_deadline() {
        let slow = bounded(Some(Duration::from_millis(10)), Phase::Read, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(SiestaError::Timeout { phase: Phase::Read })));

        let unbounded = bounded(None, Phase::Read, async { Ok(7) }).await;
        assert_eq!(unbounded.unwrap(), 7);
    }

    #[test]
    fn test_timeout_display() {
        let err = SiestaError::Timeout {
            phase: Phase::Connect,
        };
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "connect timed out");
    }
}
