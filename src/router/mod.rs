//! # Router Module
//!
//! Maps an incoming `(verb, path)` pair to the handler registered for it.
//!
//! ## Overview
//!
//! Routing is built on [`PathNode`], a trie keyed by path segment. Each
//! segment of a registered path becomes one node; a segment spelled `*`
//! matches any single segment of a request path. Lookups try literal
//! children before the wildcard child and backtrack when a literal branch
//! dead-ends, so `/v4/status/ping` prefers a `/v4/status/ping` route over
//! `/v4/*/ping` but still falls back to it.
//!
//! [`Router`] stores one handler per verb at each path node. The server asks
//! it for a [`RouteMatch`] per request; segments captured by wildcards travel
//! to the handler as [`WildcardSegments`] in the request extensions.
//!
//! ## Building a router
//!
//! Routes are registered directly with [`Router::insert`], or loaded from a
//! table of [`RouteEntry`] values (YAML, JSON, or extracted from an OpenAPI
//! document with [`RouteEntry::from_openapi`]) and resolved against a
//! [`HandlerRegistry`].
//!
//! ```rust
//! use http::{Method, Request, Response};
//! use siesta::router::{HandlerRegistry, RouteEntry, Router};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.register("ping", |_req: &Request<String>, res: &mut Response<String>| {
//!     *res.body_mut() = "pong".to_string();
//! });
//!
//! let table = vec![RouteEntry::new("/v4/*/ping", "GET", "ping")];
//! let router = Router::from_entries(&table, &registry).unwrap();
//!
//! let matched = router.lookup(&Method::GET, "/v4/alpha/ping").unwrap();
//! assert_eq!(matched.wildcards.get(0), Some("alpha"));
//! assert!(router.lookup(&Method::GET, "/v4/alpha/beta/ping").is_none());
//! ```
//!
//! The router is immutable once serving starts and is shared between sessions
//! as `Arc<Router>`.

mod core;
mod node;
mod table;

pub use core::{RouteMatch, Router, WildcardSegments, MAX_INLINE_WILDCARDS};
pub use node::{PathNode, WILDCARD};
pub use table::{HandlerRegistry, RouteEntry};
