//! # CLI Module
//!
//! Command-line front end for the demo echo service.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Run the echo service until Ctrl-C:
//!
//! ```bash
//! siesta serve --addr 127.0.0.1:8080
//! siesta --config siesta.yaml serve --routes routes.yaml
//! ```
//!
//! ### `echo`
//!
//! Submit `GET /v1/echo?message=...` requests over a single client session:
//!
//! ```bash
//! siesta echo --host localhost --port 8080 --message hi --count 3
//! ```

mod commands;


pub use commands::{load_routes, run_cli, Cli, Commands};
