use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::node::PathNode;
use super::table::{HandlerRegistry, RouteEntry};
use crate::error::SiestaError;
use crate::server::Handler;

/// Wildcard captures inline before spilling to the heap.
pub const MAX_INLINE_WILDCARDS: usize = 4;

/// Segments matched by `*` nodes, in path order.
///
/// The server inserts this into the request extensions before calling the
/// handler, so handlers read it with
/// `req.extensions().get::<WildcardSegments>()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WildcardSegments(pub SmallVec<[String; MAX_INLINE_WILDCARDS]>);

impl WildcardSegments {
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Handler resolved for a (verb, path) pair.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: Arc<dyn Handler>,
    pub wildcards: WildcardSegments,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("wildcards", &self.wildcards)
            .finish_non_exhaustive()
    }
}

type MethodMap = HashMap<Method, Arc<dyn Handler>>;

/// Maps `(verb, path)` to a handler through a [`PathNode`] trie.
///
/// Built once at startup, then shared immutably (`Arc<Router>`) by every
/// server session; lookups need no synchronization.
#[derive(Clone, Default)]
pub struct Router {
    root: PathNode<MethodMap>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut routes = Vec::new();
        self.root.for_each(|path, methods| {
            for method in methods.keys() {
                routes.push(format!("{method} {path}"));
            }
        });
        f.debug_struct("Router").field("routes", &routes).finish()
    }
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a router from a route table, resolving handler names through
    /// `registry`.
    ///
    /// # Errors
    ///
    /// `UnknownHandler` if an entry names a handler the registry lacks;
    /// `InvalidRoute` if an entry's verb is not an HTTP method.
    pub fn from_entries<'e, I>(entries: I, registry: &HandlerRegistry) -> Result<Self, SiestaError>
    where
        I: IntoIterator<Item = &'e RouteEntry>,
    {
        let mut router = Router::new();
        for entry in entries {
            let method = entry.method()?;
            let handler = registry
                .get(&entry.handler)
                .ok_or_else(|| SiestaError::UnknownHandler(entry.handler.clone()))?;
            router.insert(&entry.path, method, handler);
        }

        info!(
            routes_count = router.route_count(),
            leaf_paths = router.size(),
            "Routing table loaded"
        );
        Ok(router)
    }

    /// Register `handler` for `method` on `path`. `*` segments match any
    /// single segment. Re-registering a pair replaces the previous handler.
    pub fn insert(&mut self, path: &str, method: Method, handler: Arc<dyn Handler>) {
        let methods = self.root.get_or_insert_with(path, HashMap::new);
        if methods.insert(method.clone(), handler).is_some() {
            warn!(method = %method, path = %path, "Replaced existing route handler");
        } else {
            debug!(method = %method, path = %path, "Route registered");
        }
    }

    /// Resolve `(method, path)`. Literal segments win over wildcards; a
    /// literal branch without a handler for `method` falls back to the
    /// wildcard branch.
    #[must_use]
    pub fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let mut wildcards = WildcardSegments::default();
        let methods = self.root.find_accepting(
            path,
            |methods| methods.contains_key(method),
            |segment| wildcards.0.push(segment.to_string()),
        )?;
        let handler = Arc::clone(methods.get(method)?);
        Some(RouteMatch { handler, wildcards })
    }

    /// Whether any route passes through or ends at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.root.contains(path)
    }

    /// Verbs registered for the first path entry matching `path`, sorted.
    /// Empty when no route ends at `path`.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self
            .root
            .find_accepting(path, |methods| !methods.is_empty(), |_| {})
            .map(|methods| methods.keys().cloned().collect())
            .unwrap_or_default();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    /// Leaf count of the underlying trie.
    #[must_use]
    pub fn size(&self) -> usize {
        self.root.size()
    }

    /// Number of registered `(verb, path)` pairs.
    #[must_use]
    pub fn route_count(&self) -> usize {
        let mut count = 0;
        self.root.for_each(|_, methods| count += methods.len());
        count
    }

    /// Log every registered route at info level.
    pub fn dump_routes(&self) {
        self.root.for_each(|path, methods| {
            for method in methods.keys() {
                info!(method = %method, path = %path, "route");
            }
        });
    }
}
