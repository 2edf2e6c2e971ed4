//! # Server Module
//!
//! Accepts TCP connections and serves HTTP/1.1 requests on them through the
//! [`Router`](crate::router::Router).
//!
//! ## Overview
//!
//! - [`Acceptor`] opens the listening socket (reuse-address, bind, listen
//!   with the configured backlog) and spawns one task per connection.
//! - [`ServerSession`] is that task's state: it reads a request, looks up the
//!   handler, lets the handler write the response, and loops.
//! - [`Handler`] is the application seam. Synchronous closures of shape
//!   `Fn(&Request<String>, &mut Response<String>)` are handlers too.
//! - [`ErrorSink`] receives every failure that is not the peer quietly going
//!   away, tagged with a [`facility`] name.
//!
//! ## Teardown
//!
//! | Event | Reported as | Effect |
//! |-------|-------------|--------|
//! | peer EOF / reset while reading | nothing | session ends |
//! | other read failure or timeout | `on_read` | session ends |
//! | write failure or timeout | `on_write` | session ends |
//! | handler error | `handle_request` | session ends |
//! | handler returns without writing | `handle_request` | session ends |
//! | request carries `Connection: close` | nothing | ends after the response |
//!
//! Unknown paths get a JSON `404`; known paths under another verb get a
//! `405` with an `Allow` header.

mod acceptor;
mod handler;
mod session;
mod sink;

pub use acceptor::{Acceptor, ServerHandle};
pub use handler::Handler;
pub use session::ServerSession;
pub use sink::{facility, ErrorSink};
