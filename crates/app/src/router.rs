//! Maps `(method, path)` to an [`Application`].
//!
//! Paths are matched with [`matchit`]; besides literal paths a pattern may
//! capture segments with `{name}` or the rest of the path with `{*name}`.
//! Two patterns that could both match one request path are rejected when the
//! second is registered, so a lookup never depends on registration order.
//!
//! ```
//! use micro_app::{Body, Router, app_fn, get, post};
//!
//! let hello = app_fn(|_environ, start_response| {
//!     start_response.begin("200 OK", vec![])?;
//!     Ok(Body::from("Hello World"))
//! });
//!
//! let router = Router::builder()
//!     .route("/hello", get(hello))
//!     .unwrap()
//!     .route("/users/{id}", post(app_fn(|_environ, _start_response| Ok(Body::empty()))))
//!     .unwrap()
//!     .build();
//!
//! assert!(router.lookup(&http::Method::GET, "/hello").is_ok());
//! assert!(router.lookup(&http::Method::GET, "/users/7").is_err());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Method;
use matchit::InsertError;
use thiserror::Error;
use tracing::trace;

use crate::application::Application;

type InnerRouter = matchit::Router<Arc<dyn Application>>;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("route {method} {path} conflicts with {existing}")]
    Conflict { method: Method, path: String, existing: String },

    #[error("invalid route path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no route for {method} {path}")]
pub struct RouteNotFound {
    pub method: Method,
    pub path: String,
}

/// Values captured by `{name}` segments of the matched pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl From<matchit::Params<'_, '_>> for PathParams {
    fn from(params: matchit::Params<'_, '_>) -> Self {
        Self { params: params.iter().map(|(key, value)| (key.to_string(), value.to_string())).collect() }
    }
}

/// The routing table. Immutable once built and shared across requests.
pub struct Router {
    routes: HashMap<Method, InnerRouter>,
    fallback: Option<Arc<dyn Application>>,
}

/// The application a request was routed to, plus its captures.
pub struct RouteMatch<'router> {
    app: &'router dyn Application,
    params: PathParams,
}

impl<'router> RouteMatch<'router> {
    pub fn app(&self) -> &'router dyn Application {
        self.app
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_params(self) -> PathParams {
        self.params
    }
}

impl fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch").field("params", &self.params).finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Finds the application for `method` and `path`.
    ///
    /// `HEAD` falls back to the `GET` route of the same path. If nothing
    /// matches, the default handler (if any) gets the request.
    pub fn lookup(&self, method: &Method, path: &str) -> Result<RouteMatch<'_>, RouteNotFound> {
        let found = self.at(method, path).or_else(|| (method == Method::HEAD).then(|| self.at(&Method::GET, path)).flatten());
        if let Some(route_match) = found {
            return Ok(route_match);
        }

        match &self.fallback {
            Some(app) => {
                trace!(%method, path, "no route matched, using default handler");
                Ok(RouteMatch { app: app.as_ref(), params: PathParams::empty() })
            }
            None => Err(RouteNotFound { method: method.clone(), path: path.to_string() }),
        }
    }

    fn at(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let matched = self.routes.get(method)?.at(path).ok()?;
        Some(RouteMatch { app: matched.value.as_ref(), params: matched.params.into() })
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct RouterBuilder {
    routes: HashMap<Method, InnerRouter>,
    patterns: Vec<(Method, String)>,
    fallback: Option<Arc<dyn Application>>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("patterns", &self.patterns)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl RouterBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// Fails if `path` is malformed, or if some request path could match both
    /// `path` and a pattern already registered for `method`.
    pub fn register<A: Application + 'static>(
        self,
        method: Method,
        path: impl Into<String>,
        app: A,
    ) -> Result<Self, RouterError> {
        self.insert(method, path.into(), Arc::new(app))
    }

    pub fn route(self, path: impl Into<String>, item: RouteItem) -> Result<Self, RouterError> {
        self.insert(item.method, path.into(), item.app)
    }

    /// Handles every request no route matches.
    pub fn default_handler<A: Application + 'static>(mut self, app: A) -> Self {
        self.fallback = Some(Arc::new(app));
        self
    }

    pub fn build(self) -> Router {
        Router { routes: self.routes, fallback: self.fallback }
    }

    fn insert(mut self, method: Method, path: String, app: Arc<dyn Application>) -> Result<Self, RouterError> {
        if !path.starts_with('/') {
            return Err(RouterError::InvalidPath { path, reason: "must start with '/'".into() });
        }

        if let Some((_, existing)) =
            self.patterns.iter().find(|(registered, pattern)| *registered == method && patterns_overlap(pattern, &path))
        {
            return Err(RouterError::Conflict { method, path, existing: existing.clone() });
        }

        let router = self.routes.entry(method.clone()).or_default();
        if let Err(e) = router.insert(path.clone(), app) {
            return Err(match e {
                InsertError::Conflict { with } => RouterError::Conflict { method, path, existing: with },
                e => RouterError::InvalidPath { path, reason: e.to_string() },
            });
        }

        trace!(%method, path, "route registered");
        self.patterns.push((method, path));
        Ok(self)
    }
}

/// Whether some request path could match both patterns.
///
/// A `{name}` segment matches one non-empty segment, `{*name}` matches a
/// non-empty remainder of the path.
fn patterns_overlap(a: &str, b: &str) -> bool {
    let a_segments: Vec<&str> = a.split('/').collect();
    let b_segments: Vec<&str> = b.split('/').collect();
    let mut index = 0;
    loop {
        match (a_segments.get(index), b_segments.get(index)) {
            (None, None) => return true,
            (Some(a), Some(b)) => {
                match (is_catch_all(a), is_catch_all(b)) {
                    (true, true) => return true,
                    (true, false) => return remainder_is_non_empty(&b_segments[index..]),
                    (false, true) => return remainder_is_non_empty(&a_segments[index..]),
                    (false, false) => {}
                }
                if !segments_overlap(a, b) {
                    return false;
                }
            }
            // a catch-all never matches an empty remainder
            (Some(_), None) | (None, Some(_)) => return false,
        }
        index += 1;
    }
}

fn is_catch_all(segment: &str) -> bool {
    segment.starts_with("{*")
}

fn is_capture(segment: &str) -> bool {
    segment.contains('{')
}

fn segments_overlap(a: &str, b: &str) -> bool {
    match (is_capture(a), is_capture(b)) {
        (true, true) => true,
        (true, false) => !b.is_empty(),
        (false, true) => !a.is_empty(),
        (false, false) => a == b,
    }
}

/// Whether the path text left from `segments` can be non-empty.
fn remainder_is_non_empty(segments: &[&str]) -> bool {
    !matches!(segments, [] | [""])
}

/// A method bound to an application, registered with [`RouterBuilder::route`].
pub struct RouteItem {
    method: Method,
    app: Arc<dyn Application>,
}

impl fmt::Debug for RouteItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteItem").field("method", &self.method).finish_non_exhaustive()
    }
}

macro_rules! method_route {
    ($name:ident, $method:ident) => {
        pub fn $name<A: Application + 'static>(app: A) -> RouteItem {
            RouteItem { method: Method::$method, app: Arc::new(app) }
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(delete, DELETE);
method_route!(head, HEAD);
method_route!(options, OPTIONS);
method_route!(patch, PATCH);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::environ::test_environ;
    use crate::start_response::StartResponse;

    fn named(name: &'static str) -> impl Application + 'static {
        crate::application::app_fn(move |_environ, _start_response| Ok(Body::from(name)))
    }

    fn name_of(route_match: &RouteMatch<'_>) -> String {
        let mut environ = test_environ("/");
        let body = route_match.app().call(&mut environ, &mut StartResponse::new()).unwrap();
        match body {
            Body::Bytes(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    fn router() -> Router {
        Router::builder()
            .route("/", get(named("index")))
            .unwrap()
            .route("/", post(named("index-post")))
            .unwrap()
            .route("/users/{id}", get(named("user")))
            .unwrap()
            .register(Method::PUT, "/files/{*path}", named("files"))
            .unwrap()
            .build()
    }

    #[test]
    fn exact_lookup() {
        let router = router();

        assert_eq!(name_of(&router.lookup(&Method::GET, "/").unwrap()), "index");
        assert_eq!(name_of(&router.lookup(&Method::POST, "/").unwrap()), "index-post");

        let not_found = router.lookup(&Method::DELETE, "/").unwrap_err();
        assert_eq!(not_found, RouteNotFound { method: Method::DELETE, path: "/".into() });
        assert!(router.lookup(&Method::GET, "/missing").is_err());
    }

    #[test]
    fn captures() {
        let router = router();

        let route_match = router.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(name_of(&route_match), "user");
        assert_eq!(route_match.params().get("id"), Some("42"));
        assert_eq!(route_match.params().len(), 1);

        let route_match = router.lookup(&Method::PUT, "/files/a/b.txt").unwrap();
        assert_eq!(route_match.into_params().get("path"), Some("a/b.txt"));
    }

    #[test]
    fn head_uses_get_route() {
        let router = router();
        assert_eq!(name_of(&router.lookup(&Method::HEAD, "/users/1").unwrap()), "user");
    }

    #[test]
    fn default_handler() {
        let router = Router::builder().default_handler(named("fallback")).build();
        let route_match = router.lookup(&Method::POST, "/anything").unwrap();
        assert_eq!(name_of(&route_match), "fallback");
        assert!(route_match.params().is_empty());
    }

    #[test]
    fn conflicting_routes() {
        let conflict = |first: &str, second: &str| {
            let result = Router::builder().route(first, get(named("a"))).unwrap().route(second, get(named("b")));
            matches!(result, Err(RouterError::Conflict { .. }))
        };

        assert!(conflict("/hello", "/hello"));
        assert!(conflict("/users/{id}", "/users/{name}"));
        assert!(conflict("/users/{id}", "/users/me"));
        assert!(conflict("/static/{*rest}", "/static/css/site.css"));

        assert!(!conflict("/hello", "/world"));
        assert!(!conflict("/users/{id}", "/users/{id}/posts"));
        assert!(!conflict("/users/{id}", "/teams/{id}"));
        assert!(!conflict("/", "/{name}"));
        assert!(!conflict("/users/", "/users/{id}"));
        assert!(!conflict("/a", "/a/{*rest}"));
        assert!(!conflict("/a/", "/a/{*rest}"));
    }

    #[test]
    fn same_path_different_methods() {
        let result = Router::builder().route("/echo", get(named("a"))).unwrap().route("/echo", post(named("b")));
        assert!(result.is_ok());
    }

    #[test]
    fn invalid_path() {
        let result = Router::builder().route("hello", get(named("a")));
        assert!(matches!(result, Err(RouterError::InvalidPath { .. })));
    }

    #[test]
    fn overlap_rules() {
        assert!(patterns_overlap("/a/{x}/c", "/a/b/{y}"));
        assert!(patterns_overlap("/a/{*rest}", "/a/b/c/d"));
        assert!(!patterns_overlap("/a/{x}/c", "/a/b/d"));
        assert!(!patterns_overlap("/a", "/a/b"));
        assert!(!patterns_overlap("/", "/{name}"));
        assert!(!patterns_overlap("/users/", "/users/{id}"));
        assert!(!patterns_overlap("/a", "/a/{*rest}"));
        assert!(!patterns_overlap("/a/", "/a/{*rest}"));
        assert!(patterns_overlap("/a/{*rest}", "/a/{id}"));
        assert!(patterns_overlap("/a/{*rest}", "/a/{x}/{y}"));
    }

    #[test]
    fn empty_segment_routes_coexist() {
        let router = Router::builder()
            .route("/", get(named("root")))
            .unwrap()
            .route("/{name}", get(named("name")))
            .unwrap()
            .route("/files", get(named("files")))
            .unwrap()
            .route("/files/{*rest}", get(named("file")))
            .unwrap()
            .build();

        assert_eq!(name_of(&router.lookup(&Method::GET, "/").unwrap()), "root");
        assert_eq!(name_of(&router.lookup(&Method::GET, "/alice").unwrap()), "name");
        assert_eq!(name_of(&router.lookup(&Method::GET, "/files").unwrap()), "files");
        assert_eq!(name_of(&router.lookup(&Method::GET, "/files/a/b").unwrap()), "file");
    }
}
