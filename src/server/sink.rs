use std::fmt;
use std::sync::Arc;
use tracing::error;

use crate::error::SiestaError;

/// Facility names passed to the [`ErrorSink`] alongside each error.
pub mod facility {
    pub const ACCEPTOR_OPEN: &str = "acceptor::open";
    pub const ACCEPTOR_BIND: &str = "acceptor::bind";
    pub const ACCEPTOR_LISTEN: &str = "acceptor::listen";
    pub const ON_ACCEPT: &str = "on_accept";
    pub const ON_READ: &str = "on_read";
    pub const ON_WRITE: &str = "on_write";
    pub const HANDLE_REQUEST: &str = "handle_request";
}

type SinkFn = dyn Fn(&SiestaError, &str) + Send + Sync;

/// Receives every server-side failure that is not a quiet peer close.
///
/// The facility string names where the error happened; see [`facility`].
/// The sink is called from session tasks, so it must be cheap and must not
/// block.
#[derive(Clone)]
pub struct ErrorSink {
    inner: Arc<SinkFn>,
}

impl ErrorSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SiestaError, &str) + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// A sink that logs each report at error level.
    #[must_use]
    pub fn logging() -> Self {
        Self::new(|err, facility| {
            error!(facility = facility, error = %err, "Server error");
        })
    }

    pub fn report(&self, err: &SiestaError, facility: &str) {
        (self.inner)(err, facility);
    }
}

impl Default for ErrorSink {
    fn default() -> Self {
        Self::logging()
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_custom_sink_receives_facility() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            ErrorSink::new(move |err, facility| {
                seen.lock().push((facility.to_string(), err.to_string()));
            })
        };

        sink.report(&SiestaError::ResponseNotWritten, facility::HANDLE_REQUEST);
        let cloned = sink.clone();
        cloned.report(&SiestaError::EndOfStream, facility::ON_READ);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "handle_request");
        assert_eq!(seen[1], ("on_read".to_string(), "end of stream".to_string()));
    }
}
