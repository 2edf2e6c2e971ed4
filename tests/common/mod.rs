#![allow(dead_code)]

//! Shared fixtures for the integration tests.

use parking_lot::Mutex;
use siesta::router::Router;
use siesta::server::{Acceptor, ErrorSink, ServerHandle};
use siesta::SiestaError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Every `(facility, error)` pair the server reported.
#[derive(Clone, Default)]
pub struct RecordedErrors {
    inner: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordedErrors {
    pub fn sink(&self) -> ErrorSink {
        let inner = Arc::clone(&self.inner);
        ErrorSink::new(move |err: &SiestaError, facility: &str| {
            inner.lock().push((facility.to_string(), err.to_string()));
        })
    }

    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.inner.lock().clone()
    }

    pub fn facilities(&self) -> Vec<String> {
        self.inner.lock().iter().map(|(f, _)| f.clone()).collect()
    }

    /// Poll until at least one report arrives or `limit` passes.
    pub async fn wait_for_report(&self, limit: Duration) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            let seen = self.snapshot();
            if !seen.is_empty() || tokio::time::Instant::now() >= deadline {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Running server bound to an ephemeral port. Stopped on drop.
pub struct TestServer {
    handle: Option<ServerHandle>,
    pub addr: SocketAddr,
    pub errors: RecordedErrors,
}

impl TestServer {
    pub async fn start(router: Router) -> Self {
        Self::start_with(Acceptor::new(router)).await
    }

    pub async fn start_with(acceptor: Acceptor) -> Self {
        let errors = RecordedErrors::default();
        let handle = acceptor
            .with_error_sink(errors.sink())
            .listen("127.0.0.1:0".parse().unwrap())
            .expect("server should listen");
        handle.wait_ready().await.expect("server should become ready");
        Self {
            addr: handle.local_addr(),
            handle: Some(handle),
            errors,
        }
    }

    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.stop().await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // Aborting is enough; the runtime reaps the task.
            drop(tokio::spawn(handle.stop()));
        }
    }
}

/// Write `raw` on a fresh connection and read until the server closes it.
pub async fn send_raw(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut out))
        .await
        .expect("server should close the connection")
        .unwrap();
    String::from_utf8_lossy(&out).into_owned()
}

/// Split a raw HTTP response into status code, lower-cased headers and body.
pub fn parse_raw(resp: &str) -> (u16, Vec<(String, String)>, String) {
    let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|l| l.split_whitespace().nth(1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    (status, headers, body.to_string())
}

pub fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}
