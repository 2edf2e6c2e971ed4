//! # siesta
//!
//! **siesta** is a small asynchronous runtime layer for HTTP/1.1 services
//! built on tokio: wait primitives, client and server sessions, and a
//! path-trie router that maps `(verb, path)` to handlers.
//!
//! ## Architecture
//!
//! - **[`sync`]** - Condition variable, counting semaphore and queues built
//!   on one notification primitive
//! - **[`router`]** - Path trie with `*` wildcard segments and the verb-aware
//!   [`Router`](router::Router)
//! - **[`server`]** - Acceptor, per-connection server sessions, the
//!   [`Handler`](server::Handler) seam and the error sink
//! - **[`client`]** - Keep-alive client sessions with per-phase timeouts
//! - **[`codec`]** - HTTP/1.1 framing shared by both sides
//! - **[`config`]** - YAML + environment configuration
//! - **[`logging`]** - `tracing` subscriber setup
//!
//! ### Request flow
//!
//! ```text
//! Acceptor ─accept─▶ ServerSession ─read─▶ Router::lookup ─▶ Handler
//!                        ▲                                   │
//!                        └────────── write() ◀───────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::{Method, Request, Response};
//! use siesta::client::ClientSession;
//! use siesta::router::Router;
//! use siesta::server::Acceptor;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> siesta::Result<()> {
//! let mut router = Router::new();
//! router.insert(
//!     "/v1/hello/*",
//!     Method::GET,
//!     Arc::new(|_req: &Request<String>, res: &mut Response<String>| {
//!         *res.body_mut() = "hello".to_string();
//!     }),
//! );
//!
//! let server = Acceptor::new(router).listen("127.0.0.1:0".parse().unwrap())?;
//! server.wait_ready().await?;
//!
//! let mut client = ClientSession::default();
//! client.start_addr(server.local_addr()).await?;
//! let res = client.get("/v1/hello/world").await?;
//! assert_eq!(res.body(), "hello");
//!
//! server.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every fallible operation returns [`Result`] with [`SiestaError`]; nothing
//! panics across an `.await`. Server-side failures that have no caller are
//! delivered to an [`ErrorSink`](server::ErrorSink).

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod echo;
pub mod error;
pub mod ids;
pub mod logging;
pub mod router;
pub mod server;
pub mod sync;

pub use error::{Phase, Result, SiestaError};
