//! HTTP/1.1 client sessions.
//!
//! A [`ClientSession`] owns one connection and runs one request/response
//! exchange at a time on it:
//!
//! ```text
//! Disconnected --start--> Send --submit--> Receive --> Done --> Send
//!                                                         |
//!                           transport error or close -----+--> Disconnected
//! ```
//!
//! A session that lost its connection answers every `submit` with
//! `NotConnected` until `start` is called again; it never reads a stale
//! response left over from an earlier exchange.
//!
//! ```rust,no_run
//! use siesta::client::ClientSession;
//!
//! # async fn run() -> siesta::Result<()> {
//! let mut session = ClientSession::default();
//! session.start("localhost", 8080).await?;
//! let res = session.get("/v1/echo?message=hi").await?;
//! println!("{}", res.body());
//! # Ok(())
//! # }
//! ```

mod session;

pub use session::{ClientSession, SessionState};
