//! Route table: the ordered, named collection of HTTP route entries.
//!
//! The underlying matching structure is never mutated while the server is
//! serving. Every change builds a new table which is then published through
//! [`RouteHost`]; the dispatcher takes a snapshot per request, so in-flight
//! requests against a previous table run to completion undisturbed.
//!
//! Match precedence: method-matching exact paths first, then the longest
//! matching path prefix, then the longest matching static prefix. A path
//! prefix matches the bare prefix as well as any string-prefixed subpath; a
//! static prefix matches only `prefix/`-rooted paths, so `GET /assets`
//! (no trailing slash) is a 404, not a redirect.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::Method;
use axum::response::Response;

/// A handler invocable from the route table.
#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    async fn handle(&self, req: Request) -> Response;
}

/// A decorator applied around a [`RouteHandler`]; used by static routes to
/// compose caller middleware (outermost last).
pub type HandlerMiddleware = Arc<dyn Fn(Arc<dyn RouteHandler>) -> Arc<dyn RouteHandler> + Send + Sync>;

/// How a [`RouteEntry`] matches request paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// Exact path with a permitted-method set.
    ExactPath,
    /// Path prefix accepting all methods (REST bridge prefix routes).
    PathPrefix,
    /// Path prefix serving static files.
    StaticPrefix,
}

/// Name of the route bridging `uri` for a specific method.
pub(crate) fn exact_route_name(uri: &str, method: &Method) -> String {
    format!("{uri}-{method}")
}

/// Name of the all-methods route at `prefix` (REST bridge prefix routes).
pub(crate) fn prefix_route_name(prefix: &str) -> String {
    format!("{prefix}-*")
}

/// Name of the static route under `prefix`.
pub(crate) fn static_route_name(prefix: &str) -> String {
    format!("{prefix}*")
}

/// One named route. Immutable after insertion into a table.
#[derive(Clone)]
pub struct RouteEntry {
    name: String,
    kind: RouteKind,
    target: String,
    methods: HashSet<Method>,
    handler: Arc<dyn RouteHandler>,
}

impl RouteEntry {
    pub(crate) fn exact(
        uri: impl Into<String>,
        methods: HashSet<Method>,
        handler: Arc<dyn RouteHandler>,
        name: String,
    ) -> Self {
        Self {
            name,
            kind: RouteKind::ExactPath,
            target: uri.into(),
            methods,
            handler,
        }
    }

    pub(crate) fn prefix(prefix: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        let target = prefix.into();
        Self {
            name: prefix_route_name(&target),
            kind: RouteKind::PathPrefix,
            target,
            methods: HashSet::new(),
            handler,
        }
    }

    pub(crate) fn static_prefix(prefix: impl Into<String>, handler: Arc<dyn RouteHandler>) -> Self {
        let target = prefix.into();
        Self {
            name: static_route_name(&target),
            kind: RouteKind::StaticPrefix,
            target,
            methods: HashSet::new(),
            handler,
        }
    }

    /// Stable name, unique within a table.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    /// The matched path (exact routes) or prefix (prefix routes).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Permitted methods; empty means every method is accepted.
    pub fn methods(&self) -> &HashSet<Method> {
        &self.methods
    }

    pub(crate) fn handler(&self) -> Arc<dyn RouteHandler> {
        Arc::clone(&self.handler)
    }

    fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        match self.kind {
            RouteKind::ExactPath => self.target == path && self.allows(method),
            RouteKind::PathPrefix => path.starts_with(&self.target),
            RouteKind::StaticPrefix => {
                path.len() > self.target.len() && path.starts_with(&self.target) && {
                    path.as_bytes()[self.target.len()] == b'/'
                }
            }
        }
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("target", &self.target)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// An ordered, name-unique collection of routes. Cheap to copy entry-wise;
/// handlers are shared by `Arc`.
#[derive(Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// New table with `entry` appended. The receiver is untouched.
    pub(crate) fn with_entry(&self, entry: RouteEntry) -> Self {
        let mut entries = self.entries.clone();
        entries.push(entry);
        Self { entries }
    }

    /// New table containing every entry whose name is not in `victims`,
    /// preserving order, paths, method sets, and handlers.
    pub(crate) fn retain_except(&self, victims: &HashSet<String>) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .filter(|e| !victims.contains(&e.name))
                .cloned()
                .collect(),
        }
    }

    /// Find the entry serving `method path`, by precedence: exact match
    /// first, then the longest path prefix, then the longest static prefix.
    pub(crate) fn find_match(&self, method: &Method, path: &str) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .find(|e| e.kind == RouteKind::ExactPath && e.matches(method, path))
            .or_else(|| self.longest_prefix(RouteKind::PathPrefix, method, path))
            .or_else(|| self.longest_prefix(RouteKind::StaticPrefix, method, path))
    }

    fn longest_prefix(&self, kind: RouteKind, method: &Method, path: &str) -> Option<&RouteEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == kind && e.matches(method, path))
            .max_by_key(|e| e.target.len())
    }
}

/// The published route table: a single atomically-swappable reference read
/// by the dispatcher. Writers build a new table and [`publish`](Self::publish)
/// it; readers [`snapshot`](Self::snapshot) and keep serving from their copy.
pub struct RouteHost {
    current: RwLock<Arc<RouteTable>>,
}

impl RouteHost {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RouteTable::new())),
        }
    }

    pub fn snapshot(&self) -> Arc<RouteTable> {
        Arc::clone(&self.current.read().unwrap_or_else(|p| p.into_inner()))
    }

    pub fn publish(&self, table: RouteTable) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = Arc::new(table);
    }
}

impl Default for RouteHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    struct TagHandler(&'static str);

    #[async_trait]
    impl RouteHandler for TagHandler {
        async fn handle(&self, _req: Request) -> Response {
            self.0.into_response()
        }
    }

    fn handler(tag: &'static str) -> Arc<dyn RouteHandler> {
        Arc::new(TagHandler(tag))
    }

    fn exact(uri: &str, method: Method, tag: &'static str) -> RouteEntry {
        let name = exact_route_name(uri, &method);
        RouteEntry::exact(uri, HashSet::from([method]), handler(tag), name)
    }

    #[test]
    fn exact_match_requires_the_method() {
        let table = RouteTable::new().with_entry(exact("/ping", Method::GET, "ping"));
        assert!(table.find_match(&Method::GET, "/ping").is_some());
        assert!(table.find_match(&Method::POST, "/ping").is_none());
        assert!(table.find_match(&Method::GET, "/pong").is_none());
    }

    #[test]
    fn exact_beats_prefix() {
        let table = RouteTable::new()
            .with_entry(RouteEntry::prefix("/api", handler("prefix")))
            .with_entry(exact("/api/ping", Method::GET, "exact"));
        let hit = table.find_match(&Method::GET, "/api/ping").unwrap();
        assert_eq!(hit.kind(), RouteKind::ExactPath);
    }

    #[test]
    fn longest_prefix_wins() {
        let table = RouteTable::new()
            .with_entry(RouteEntry::prefix("/api", handler("short")))
            .with_entry(RouteEntry::prefix("/api/v2", handler("long")));
        let hit = table.find_match(&Method::GET, "/api/v2/users").unwrap();
        assert_eq!(hit.target(), "/api/v2");
    }

    #[test]
    fn path_prefix_matches_the_bare_prefix() {
        let table = RouteTable::new().with_entry(RouteEntry::prefix("/files", handler("files")));
        assert!(table.find_match(&Method::GET, "/files").is_some());
        assert!(table.find_match(&Method::PUT, "/files/a/b/c").is_some());
        assert!(table.find_match(&Method::GET, "/unrelated").is_none());
    }

    #[test]
    fn static_prefix_requires_a_slash_rooted_subpath() {
        let table =
            RouteTable::new().with_entry(RouteEntry::static_prefix("/assets", handler("static")));
        assert!(table.find_match(&Method::GET, "/assets/app.js").is_some());
        // Bare prefix: no redirect, no match.
        assert!(table.find_match(&Method::GET, "/assets").is_none());
        assert!(table.find_match(&Method::GET, "/assetsX").is_none());
    }

    #[test]
    fn root_prefix_is_a_true_fallback() {
        let table = RouteTable::new()
            .with_entry(exact("/ping", Method::GET, "ping"))
            .with_entry(RouteEntry::prefix("/api", handler("api")))
            .with_entry(RouteEntry::prefix("/", handler("spa")));
        assert_eq!(
            table.find_match(&Method::GET, "/anything").unwrap().target(),
            "/"
        );
        assert_eq!(
            table.find_match(&Method::GET, "/api/x").unwrap().target(),
            "/api"
        );
    }

    #[test]
    fn retain_except_preserves_the_survivors() {
        let table = RouteTable::new()
            .with_entry(exact("/a", Method::GET, "a"))
            .with_entry(exact("/b", Method::GET, "b"))
            .with_entry(exact("/c", Method::POST, "c"));
        let victims = HashSet::from([exact_route_name("/b", &Method::GET)]);
        let rebuilt = table.retain_except(&victims);

        assert_eq!(rebuilt.len(), 2);
        assert!(rebuilt.lookup_by_name("/a-GET").is_some());
        assert!(rebuilt.lookup_by_name("/b-GET").is_none());
        assert!(rebuilt.lookup_by_name("/c-POST").is_some());
        // Old table untouched.
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn published_snapshots_are_independent() {
        let host = RouteHost::new();
        let before = host.snapshot();
        host.publish(RouteTable::new().with_entry(exact("/new", Method::GET, "new")));
        // The earlier snapshot still serves the old table.
        assert!(before.is_empty());
        assert_eq!(host.snapshot().len(), 1);
    }
}
