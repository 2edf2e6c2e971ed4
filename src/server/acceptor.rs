use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, info_span, Instrument};

use super::session::ServerSession;
use super::sink::{facility, ErrorSink};
use crate::config::ServerConfig;
use crate::error::{Result, SiestaError};
use crate::ids::SessionIdGenerator;
use crate::router::Router;

/// Listens on one address and spawns a [`ServerSession`] per connection.
///
/// ```rust,no_run
/// use siesta::router::Router;
/// use siesta::server::Acceptor;
///
/// # async fn run(router: Router) -> siesta::Result<()> {
/// let handle = Acceptor::new(router).listen("127.0.0.1:8080".parse().unwrap())?;
/// handle.wait_ready().await?;
/// let _ = handle.join().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Acceptor {
    router: Arc<Router>,
    config: Arc<ServerConfig>,
    sink: ErrorSink,
}

impl Acceptor {
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self::from_shared(Arc::new(router))
    }

    #[must_use]
    pub fn from_shared(router: Arc<Router>) -> Self {
        Self {
            router,
            config: Arc::new(ServerConfig::default()),
            sink: ErrorSink::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    #[must_use]
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.sink = sink;
        self
    }

    /// Open, configure, bind and listen, then start accepting in the
    /// background. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// A failure at any setup step is reported to the error sink under
    /// `acceptor::open`, `acceptor::bind` or `acceptor::listen` and returned;
    /// nothing is left running.
    pub fn listen(self, addr: SocketAddr) -> Result<ServerHandle> {
        let listener = self.open(addr)?;
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            backlog = self.config.backlog,
            routes_count = self.router.route_count(),
            "Server listening"
        );

        let task = tokio::spawn(accept_loop(listener, self.router, self.config, self.sink));
        Ok(ServerHandle {
            addr: local_addr,
            task,
        })
    }

    fn open(&self, addr: SocketAddr) -> Result<TcpListener> {
        let step = |result: io::Result<()>, facility: &str| {
            result.map_err(|e| {
                let err = SiestaError::Io(e);
                self.sink.report(&err, facility);
                err
            })
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        };
        let socket = match socket {
            Ok(socket) => socket,
            Err(e) => {
                let err = SiestaError::Io(e);
                self.sink.report(&err, facility::ACCEPTOR_OPEN);
                return Err(err);
            }
        };
        step(socket.set_reuseaddr(true), facility::ACCEPTOR_OPEN)?;
        step(socket.bind(addr), facility::ACCEPTOR_BIND)?;
        socket.listen(self.config.backlog).map_err(|e| {
            let err = SiestaError::Io(e);
            self.sink.report(&err, facility::ACCEPTOR_LISTEN);
            err
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    router: Arc<Router>,
    config: Arc<ServerConfig>,
    sink: ErrorSink,
) {
    let ids = SessionIdGenerator::new();
    // Dropping the set aborts every live session.
    let mut sessions = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %err, "Failed to set TCP_NODELAY");
                    }
                    let id = ids.next_id();
                    let session = ServerSession::new(id, stream, peer, Arc::clone(&config));
                    let span = info_span!("session", session_id = %id, peer = %peer);
                    sessions.spawn(session.run(Arc::clone(&router), sink.clone()).instrument(span));
                }
                Err(e) => sink.report(&SiestaError::Io(e), facility::ON_ACCEPT),
            },
            Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                if let Err(err) = finished {
                    if err.is_panic() {
                        error!(error = %err, "Session task panicked");
                    }
                }
            }
        }
    }
}

/// Handle to a running acceptor.
///
/// Dropping the handle leaves the acceptor running; use [`stop`](Self::stop)
/// to shut it down.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address; resolves port `0` to the port actually assigned.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait until the listener accepts connections.
    ///
    /// Checks the address with TCP connects, up to 50 attempts 5ms apart.
    ///
    /// # Errors
    ///
    /// `TimedOut` if no connect succeeded.
    pub async fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting and abort every live session.
    pub async fn stop(self) {
        self.task.abort();
        match self.task.await {
            Err(err) if err.is_panic() => error!(error = %err, "Acceptor task panicked"),
            _ => info!(addr = %self.addr, "Server stopped"),
        }
    }

    /// Wait for the acceptor task to finish. It only finishes if it is
    /// aborted or panics.
    ///
    /// # Errors
    ///
    /// The task's `JoinError`.
    pub async fn join(self) -> std::result::Result<(), JoinError> {
        self.task.await
    }
}
