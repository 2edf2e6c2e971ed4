//! Path trie with wildcard segments.
//!
//! Paths are split on `/` and each segment becomes one node. A node whose key
//! is `*` is a wildcard: during wildcard-aware traversal it matches any single
//! segment. Empty segments are dropped, so `/`, `/a/` and `//a` normalise to
//! `[]`, `[a]` and `[a]`.
//!
//! ## Matching Rules
//!
//! - **Exact** ([`PathNode::at`]): every segment must equal a node key; a
//!   wildcard node only matches the literal token `*`.
//! - **Wildcard** ([`PathNode::at_wildcard`]): at each level the literal child
//!   is tried first, then the wildcard child. If the literal branch dead-ends
//!   the search backtracks into the wildcard branch.
//!
//! Values may live on interior nodes as well as leaves: inserting `/a/b` and
//! `/a/b/c` makes both paths resolvable. [`PathNode::size`] still counts only
//! leaves.
//!
//! ## Example
//!
//! ```rust
//! use siesta::router::PathNode;
//!
//! let tree: PathNode<u32> = [("/api/v4/*/ping", 1), ("/api/v4/*/time", 2)]
//!     .into_iter()
//!     .collect();
//!
//! let mut captured = Vec::new();
//! assert_eq!(tree.at_wildcard("/api/v4/alpha/ping", |s| captured.push(s.to_string())), Some(&1));
//! assert_eq!(captured, vec!["alpha"]);
//! assert_eq!(tree.at("/api/v4/alpha/ping"), None);
//! ```

use smallvec::SmallVec;

/// Key of a node that matches any single segment.
pub const WILDCARD: &str = "*";

/// Segment list for one path; routes deeper than this spill to the heap.
pub(crate) type Segments<'p> = SmallVec<[&'p str; 8]>;

/// Split a slash-delimited path into its non-empty segments.
pub(crate) fn split_path(path: &str) -> Segments<'_> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[derive(Debug, Clone)]
pub struct PathNode<V> {
    key: String,
    value: Option<V>,
    children: Vec<PathNode<V>>,
}

impl<V> Default for PathNode<V> {
    fn default() -> Self {
        Self::with_key("")
    }
}

impl<V> PathNode<V> {
    /// An empty root node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_key(key: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            children: Vec::new(),
        }
    }

    /// The segment this node represents. Empty for the root.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn children(&self) -> &[PathNode<V>] {
        &self.children
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.key == WILDCARD
    }

    /// Store `value` at `path`, creating intermediate nodes as needed.
    ///
    /// Returns the value previously stored at that exact path.
    pub fn insert(&mut self, path: &str, value: V) -> Option<V> {
        self.node_mut(&split_path(path)).value.replace(value)
    }

    /// Mutable access to the value at `path`, inserting `default()` first if
    /// the path holds no value yet.
    pub fn get_or_insert_with<F>(&mut self, path: &str, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        self.node_mut(&split_path(path))
            .value
            .get_or_insert_with(default)
    }

    fn node_mut(&mut self, segments: &[&str]) -> &mut PathNode<V> {
        let Some((segment, rest)) = segments.split_first() else {
            return self;
        };
        let idx = match self.children.iter().position(|c| c.key == *segment) {
            Some(idx) => idx,
            None => {
                self.children.push(PathNode::with_key(segment));
                self.children.len() - 1
            }
        };
        self.children[idx].node_mut(rest)
    }

    fn child(&self, key: &str) -> Option<&PathNode<V>> {
        self.children.iter().find(|c| c.key == key)
    }

    fn exact(&self, segments: &[&str]) -> Option<&PathNode<V>> {
        match segments.split_first() {
            None => Some(self),
            Some((segment, rest)) => self.child(segment)?.exact(rest),
        }
    }

    /// Exact lookup. Wildcard nodes only match the literal token `*`.
    #[must_use]
    pub fn at(&self, path: &str) -> Option<&V> {
        self.exact(&split_path(path))?.value.as_ref()
    }

    pub fn at_mut(&mut self, path: &str) -> Option<&mut V> {
        let segments = split_path(path);
        let mut node = self;
        for segment in segments {
            node = node.children.iter_mut().find(|c| c.key == segment)?;
        }
        node.value.as_mut()
    }

    /// Wildcard-aware lookup.
    ///
    /// On success `callback` is invoked once per segment consumed by a
    /// wildcard node, in path order.
    pub fn at_wildcard<F>(&self, path: &str, callback: F) -> Option<&V>
    where
        F: FnMut(&str),
    {
        self.find_accepting(path, |_| true, callback)
    }

    /// Wildcard-aware lookup that only stops at values for which `accept`
    /// holds, backtracking past nodes whose value is rejected.
    pub fn find_accepting<A, F>(&self, path: &str, accept: A, mut callback: F) -> Option<&V>
    where
        A: Fn(&V) -> bool,
        F: FnMut(&str),
    {
        let segments = split_path(path);
        let mut captures: SmallVec<[&str; 4]> = SmallVec::new();
        let value = self.search(&segments, &accept, &mut captures)?;
        for capture in captures {
            callback(capture);
        }
        Some(value)
    }

    fn search<'s, 'p, A>(
        &'s self,
        segments: &[&'p str],
        accept: &A,
        captures: &mut SmallVec<[&'p str; 4]>,
    ) -> Option<&'s V>
    where
        A: Fn(&V) -> bool,
    {
        let Some((segment, rest)) = segments.split_first() else {
            return self.value.as_ref().filter(|v| accept(*v));
        };

        // Literal match takes priority over the wildcard.
        if *segment != WILDCARD {
            if let Some(found) = self
                .child(segment)
                .and_then(|c| c.search(rest, accept, captures))
            {
                return Some(found);
            }
        }

        let wildcard = self.child(WILDCARD)?;
        captures.push(*segment);
        let found = wildcard.search(rest, accept, captures);
        if found.is_none() {
            captures.pop();
        }
        found
    }

    /// Whether `path` names any node, interior or leaf, with wildcard nodes
    /// matching any segment. Values are ignored.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.reaches(&split_path(path))
    }

    fn reaches(&self, segments: &[&str]) -> bool {
        let Some((segment, rest)) = segments.split_first() else {
            return true;
        };
        self.child(segment).is_some_and(|c| c.reaches(rest))
            || self.child(WILDCARD).is_some_and(|c| c.reaches(rest))
    }

    /// Whether the exact `path` holds a value equal to `value`.
    #[must_use]
    pub fn contains_value(&self, path: &str, value: &V) -> bool
    where
        V: PartialEq,
    {
        self.at(path).is_some_and(|v| v == value)
    }

    /// Number of leaf nodes. A childless node counts itself, so this is at
    /// least 1.
    #[must_use]
    pub fn size(&self) -> usize {
        if self.children.is_empty() {
            return 1;
        }
        self.children.iter().map(PathNode::size).sum()
    }

    /// Number of nodes holding a value, interior nodes included.
    #[must_use]
    pub fn value_count(&self) -> usize {
        usize::from(self.value.is_some())
            + self.children.iter().map(PathNode::value_count).sum::<usize>()
    }

    /// Visit every stored value with its normalised path.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&str, &V),
    {
        let mut path = String::new();
        self.walk(&mut path, &mut f);
    }

    fn walk<F>(&self, path: &mut String, f: &mut F)
    where
        F: FnMut(&str, &V),
    {
        let len = path.len();
        if !self.key.is_empty() {
            path.push('/');
            path.push_str(&self.key);
        }
        if let Some(value) = &self.value {
            f(if path.is_empty() { "/" } else { path.as_str() }, value);
        }
        for child in &self.children {
            child.walk(path, f);
        }
        path.truncate(len);
    }

    /// Order children lexicographically by key, recursively.
    pub fn sort(&mut self) {
        self.children.sort_by(|a, b| a.key.cmp(&b.key));
        for child in &mut self.children {
            child.sort();
        }
    }
}

impl<P, V> FromIterator<(P, V)> for PathNode<V>
where
    P: AsRef<str>,
{
    fn from_iter<I: IntoIterator<Item = (P, V)>>(iter: I) -> Self {
        let mut root = PathNode::new();
        for (path, value) in iter {
            root.insert(path.as_ref(), value);
        }
        root
    }
}
