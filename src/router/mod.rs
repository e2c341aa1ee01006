//! Route registration, compilation and dispatch.
//!
//! A [`Router`] collects registrations into a radix [`Trie`]; calling
//! [`Router::compile`] turns it into a [`CompiledRouter`] that answers
//! requests without walking the trie again. Three pattern styles are
//! supported and may be combined:
//!
//! | Pattern              | Example match              | Captured params             |
//! |----------------------|----------------------------|-----------------------------|
//! | `/users`             | `/users`                   | *(none)*                    |
//! | `/users/:id`         | `/users/42`                | `id → "42"`                 |
//! | `/files/*`           | `/files/docs/readme.txt`   | `* → "docs/readme.txt"`     |
//!
//! Static text beats a parameter, which beats a wildcard. Paths are matched
//! exactly: `/users/` and `/users` are different routes. The query string is
//! never part of the routed path.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::body::{BodyError, BodyKind};
use crate::compiler::PathMatcher;
use crate::config::RouterOptions;
use crate::context::{Context, Parameters};
use crate::handler::{Handler, HandlerError, IntoHandler, IntoReply, Reply};
use crate::middleware::{self, Chain, Fallbacks, Hooks, IntoVerdict};
use crate::trie::{RouteError, Trie, normalize};
use crate::{Method, Request, Response, StatusCode};

#[derive(Clone)]
struct Route {
    handler: Handler,
    body: BodyKind,
}

/// Everything registered at one routing location.
///
/// Returned by [`Router::at`] and the method helpers so several methods and
/// hooks can be attached to one location in a single expression:
///
/// ```
/// use rroute::{Response, Router, StatusCode};
/// use rroute::context::Context;
///
/// # fn main() -> Result<(), rroute::trie::RouteError> {
/// let mut router = Router::new();
/// router
///     .at("/users/:id")?
///     .on("GET", |ctx: Context| async move { format!("user {}", ctx.param("id").unwrap_or("")) })
///     .on("DELETE", |_ctx| async { Response::new(StatusCode::NoContent) });
/// assert_eq!(router.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Endpoint {
    pattern: String,
    routes: Vec<(Method, Route)>,
    all: Option<Route>,
    hooks: Hooks,
}

impl Endpoint {
    /// The normalized pattern this location was first registered under.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Registers `handler` for `method`, replacing any earlier one.
    pub fn on(&mut self, method: impl Into<Method>, handler: impl IntoHandler) -> &mut Self {
        self.on_parsed(method, BodyKind::None, handler)
    }

    /// Registers `handler` for `method`, parsing the body as `body` first.
    pub fn on_parsed(
        &mut self,
        method: impl Into<Method>,
        body: BodyKind,
        handler: impl IntoHandler,
    ) -> &mut Self {
        let method = method.into();
        let route = Route {
            handler: handler.into_handler(),
            body,
        };
        match self.routes.iter_mut().find(|(m, _)| *m == method) {
            Some((_, slot)) => {
                warn!(method = %method, path = %self.pattern, "replacing existing handler");
                *slot = route;
            }
            None => {
                debug!(method = %method, path = %self.pattern, "route registered");
                self.routes.push((method, route));
            }
        }
        self
    }

    /// Registers `handler` for every method without a handler of its own.
    pub fn all(&mut self, handler: impl IntoHandler) -> &mut Self {
        if self.all.is_some() {
            warn!(path = %self.pattern, "replacing existing catch-all handler");
        } else {
            debug!(path = %self.pattern, "catch-all route registered");
        }
        self.all = Some(Route {
            handler: handler.into_handler(),
            body: BodyKind::None,
        });
        self
    }

    /// Sets the guard for this location and everything beneath it.
    pub fn guard<F, Fut, R>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoVerdict,
    {
        self.hooks.guard = Some(middleware::guard(f));
        self
    }

    /// Sets the handler that answers when the guard rejects.
    pub fn reject(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.hooks.reject = Some(handler.into_handler());
        self
    }

    /// Sets the reply post-processor for this location and everything
    /// beneath it.
    pub fn wrap<F, R>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Reply) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.hooks.wrap = Some(middleware::wrap(f));
        self
    }

    /// Methods with a handler of their own.
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.routes.iter().map(|(method, _)| method)
    }

    fn serves(&self, method: &Method) -> bool {
        self.all.is_some() || self.routes.iter().any(|(m, _)| m == method)
    }

    fn is_routable(&self) -> bool {
        self.all.is_some() || !self.routes.is_empty()
    }

    fn route_count(&self) -> usize {
        self.routes.len() + usize::from(self.all.is_some())
    }
}

/// Builder for a route table.
///
/// Registration happens up front, on one thread; [`compile`](Self::compile)
/// then produces the immutable [`CompiledRouter`] that serves requests.
///
/// # Examples
///
/// ```
/// use rroute::{Response, Router, StatusCode};
/// use rroute::context::Context;
///
/// # fn main() -> Result<(), rroute::trie::RouteError> {
/// let mut router = Router::new();
///
/// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) })?;
///
/// router.get("/users/:id", |ctx: Context| async move {
///     let id = ctx.param("id").unwrap_or("unknown").to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// })?;
///
/// let router = router.compile();
/// assert_eq!(router.len(), 2);
/// # Ok(())
/// # }
/// ```
pub struct Router {
    trie: Trie<Endpoint>,
    options: RouterOptions,
    fallbacks: Fallbacks,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new, empty `Router` with default options.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rroute::Router;
    ///
    /// let router = Router::new();
    /// assert!(router.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    /// Create a new, empty `Router` tuned by `options`.
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            trie: Trie::new(),
            options,
            fallbacks: Fallbacks::default(),
        }
    }

    /// Returns the location `path` resolves to, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails when `path` is malformed or names a parameter differently from
    /// an already registered pattern at the same position. A failed call
    /// leaves the router unchanged.
    pub fn at(&mut self, path: &str) -> Result<&mut Endpoint, RouteError> {
        let id = self.trie.insert(path)?;
        let endpoint = self.trie.store_mut(id);
        if endpoint.pattern.is_empty() {
            endpoint.pattern = normalize(path);
        }
        Ok(endpoint)
    }

    /// Register `handler` for `method` requests matching `path`.
    ///
    /// # Arguments
    ///
    /// - `method` — an HTTP method, e.g. `Method::Get` or `"PURGE"`.
    /// - `path` — URL pattern string (e.g. `"/users"`, `"/users/:id"`, or `"/files/*"`).
    /// - `handler` — Async function that receives a [`Context`] and returns
    ///   anything implementing [`IntoReply`].
    pub fn add(
        &mut self,
        method: impl Into<Method>,
        path: &str,
        handler: impl IntoHandler,
    ) -> Result<&mut Endpoint, RouteError> {
        Ok(self.at(path)?.on(method, handler))
    }

    /// Like [`add`](Self::add), parsing the request body as `body` before the
    /// handler runs.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rroute::{Method, Router};
    /// use rroute::body::BodyKind;
    /// use rroute::context::Context;
    ///
    /// let mut router = Router::new();
    /// router
    ///     .add_parsed(Method::Post, "/users", BodyKind::Json, |ctx: Context| async move {
    ///         ctx.body().as_json().cloned().unwrap_or_default()
    ///     })
    ///     .unwrap();
    /// ```
    pub fn add_parsed(
        &mut self,
        method: impl Into<Method>,
        path: &str,
        body: BodyKind,
        handler: impl IntoHandler,
    ) -> Result<&mut Endpoint, RouteError> {
        Ok(self.at(path)?.on_parsed(method, body, handler))
    }

    /// Register a handler for `GET` requests matching `path`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rroute::{Router, Response, StatusCode};
    ///
    /// let mut router = Router::new();
    /// router.get("/hello", |_ctx| async { Response::new(StatusCode::Ok) }).unwrap();
    /// ```
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Get, path, handler)
    }

    /// Register a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Post, path, handler)
    }

    /// Register a handler for `PUT` requests matching `path`.
    pub fn put(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Put, path, handler)
    }

    /// Register a handler for `DELETE` requests matching `path`.
    pub fn delete(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Delete, path, handler)
    }

    /// Register a handler for `PATCH` requests matching `path`.
    pub fn patch(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Patch, path, handler)
    }

    /// Register a handler for `HEAD` requests matching `path`.
    pub fn head(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Head, path, handler)
    }

    /// Register a handler for `OPTIONS` requests matching `path`.
    pub fn options(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        self.add(Method::Options, path, handler)
    }

    /// Register a handler for every method at `path` that has no handler of
    /// its own.
    pub fn all(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        Ok(self.at(path)?.all(handler))
    }

    /// Guard every route at or beneath `path`.
    ///
    /// A guard on `/admin` covers `/admin` and every route under `/admin/`;
    /// one on `/admin/` or `/admin/*` covers every route starting with
    /// `/admin/`, and one on `/` covers the whole router. The nearest guard
    /// along a path wins.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rroute::Router;
    /// use rroute::context::Context;
    /// use rroute::middleware::Verdict;
    ///
    /// let mut router = Router::new();
    /// router
    ///     .guard("/admin", |ctx: Context| async move {
    ///         let ok = ctx.request().headers().get("x-role") == Some("admin");
    ///         Verdict::when(ok, ctx)
    ///     })
    ///     .unwrap();
    /// ```
    pub fn guard<F, Fut, R>(&mut self, path: &str, f: F) -> Result<&mut Endpoint, RouteError>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoVerdict,
    {
        Ok(self.at(path)?.guard(f))
    }

    /// Answer guard rejections at or beneath `path` with `handler`.
    pub fn reject(&mut self, path: &str, handler: impl IntoHandler) -> Result<&mut Endpoint, RouteError> {
        Ok(self.at(path)?.reject(handler))
    }

    /// Post-process replies of every route at or beneath `path`.
    pub fn wrap<F, R>(&mut self, path: &str, f: F) -> Result<&mut Endpoint, RouteError>
    where
        F: Fn(Reply) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Ok(self.at(path)?.wrap(f))
    }

    /// Handler for requests no route matches, and for guard rejections
    /// without a reject handler. Defaults to a plain `404 Not Found`.
    pub fn not_found(&mut self, handler: impl IntoHandler) -> &mut Self {
        self.fallbacks.not_found = handler.into_handler();
        self
    }

    /// Handler for requests whose body fails to parse. Defaults to
    /// `400 Bad Request` with the parse error as the body.
    pub fn bad_request<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Context, &BodyError) -> Response + Send + Sync + 'static,
    {
        self.fallbacks.bad_request = Arc::new(f);
        self
    }

    /// Handler for failures raised anywhere in a route's chain. Defaults to
    /// `500 Internal Server Error`.
    pub fn server_error<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&HandlerError) -> Response + Send + Sync + 'static,
    {
        self.fallbacks.server_error = Arc::new(f);
        self
    }

    /// Return the number of (method, location) routes, catch-alls included.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rroute::{Router, Response, StatusCode};
    ///
    /// let mut router = Router::new();
    /// assert_eq!(router.len(), 0);
    /// router.get("/a", |_ctx| async { Response::new(StatusCode::Ok) }).unwrap();
    /// assert_eq!(router.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.trie.stores().map(|(_, endpoint)| endpoint.route_count()).sum()
    }

    /// Return `true` if no routes have been registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closes registration and builds the request-time matchers.
    ///
    /// One path matcher is compiled per registered method, covering the
    /// locations that method (or a catch-all) can reach; methods that reach
    /// exactly the same locations share one matcher. Inherited hooks are
    /// resolved into each route's [`Chain`] here, once.
    pub fn compile(self) -> CompiledRouter {
        let Router {
            trie,
            options,
            fallbacks,
        } = self;
        let scopes = trie.scopes();

        let mut methods: Vec<Method> = Vec::new();
        for (_, endpoint) in trie.stores() {
            for method in endpoint.methods() {
                if !methods.contains(method) {
                    methods.push(method.clone());
                }
            }
        }
        methods.sort_by(method_order);

        let mut shared: HashMap<Vec<bool>, Arc<PathMatcher>> = HashMap::new();
        let mut per_method = Vec::with_capacity(methods.len());
        for method in methods {
            let live: Vec<bool> = trie.stores().map(|(_, ep)| ep.serves(&method)).collect();
            let matcher = shared
                .entry(live)
                .or_insert_with(|| {
                    Arc::new(PathMatcher::compile(
                        &trie,
                        |ep: &Endpoint| ep.serves(&method),
                        &options.matcher,
                    ))
                })
                .clone();
            per_method.push((method, matcher));
        }
        let method_count = per_method.len();

        let any = trie
            .stores()
            .any(|(_, ep)| ep.all.is_some())
            .then(|| PathMatcher::compile(&trie, |ep: &Endpoint| ep.all.is_some(), &options.matcher));
        let every = options
            .method_not_allowed
            .then(|| PathMatcher::compile(&trie, Endpoint::is_routable, &options.matcher));

        let endpoints: Vec<CompiledEndpoint> = trie
            .stores()
            .map(|(id, endpoint)| {
                let inherited = scopes[id.index()]
                    .iter()
                    .fold(Hooks::default(), |hooks, outer| hooks.overlay(&trie.store(*outer).hooks));
                CompiledEndpoint::new(endpoint, &inherited.overlay(&endpoint.hooks))
            })
            .collect();

        let compiled = CompiledRouter {
            dispatch: Dispatch::new(per_method),
            endpoints,
            any,
            every,
            fallbacks,
        };
        info!(
            routes = compiled.len(),
            methods = method_count,
            matchers = shared.len(),
            nodes = trie.node_count(),
            "router compiled"
        );
        compiled
    }
}

/// The methods a path accepts, in a stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedMethods {
    methods: Vec<Method>,
}

impl AllowedMethods {
    /// Sorts (GET, HEAD, POST, PUT, DELETE, PATCH, OPTIONS, ...) and
    /// de-duplicates `methods`.
    pub fn new(mut methods: Vec<Method>) -> Self {
        methods.sort_by(method_order);
        methods.dedup();
        Self { methods }
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Value for an `Allow` header, e.g. `GET, POST`.
    pub fn header_value(&self) -> String {
        self.methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn method_order(a: &Method, b: &Method) -> Ordering {
    a.rank()
        .cmp(&b.rank())
        .then_with(|| a.as_str().cmp(b.as_str()))
}

/// Result of looking up a (method, path) pair.
#[derive(Debug)]
pub enum Lookup<'r> {
    /// A route serves this method at this path.
    Found(RouteMatch<'r>),
    /// The path is routable, but not with this method.
    MethodNotAllowed { allowed: AllowedMethods },
    /// No route matches the path.
    NotFound,
}

/// A matched route and the parameters captured from the path.
#[derive(Debug)]
pub struct RouteMatch<'r> {
    chain: &'r Chain,
    params: Parameters,
}

impl<'r> RouteMatch<'r> {
    /// The pattern the route was registered under, e.g. `/users/:id`.
    pub fn pattern(&self) -> &'r str {
        self.chain.pattern()
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn chain(&self) -> &'r Chain {
        self.chain
    }

    pub fn into_params(self) -> Parameters {
        self.params
    }
}

// Method-keyed table with a direct comparison when only one method is present.
enum Dispatch<T> {
    Empty,
    Single(Method, T),
    Many(HashMap<Method, T>),
}

impl<T> Dispatch<T> {
    fn new(mut entries: Vec<(Method, T)>) -> Self {
        if entries.len() > 1 {
            return Self::Many(entries.into_iter().collect());
        }
        match entries.pop() {
            Some((method, value)) => Self::Single(method, value),
            None => Self::Empty,
        }
    }

    #[inline]
    fn get(&self, method: &Method) -> Option<&T> {
        match self {
            Self::Empty => None,
            Self::Single(only, value) => (only == method).then_some(value),
            Self::Many(table) => table.get(method),
        }
    }
}

struct CompiledEndpoint {
    pattern: Arc<str>,
    methods: Dispatch<Chain>,
    all: Option<Chain>,
    allowed: AllowedMethods,
}

impl CompiledEndpoint {
    fn new(endpoint: &Endpoint, hooks: &Hooks) -> Self {
        let pattern: Arc<str> = Arc::from(endpoint.pattern.as_str());
        let chain = |route: &Route| {
            Chain::new(pattern.clone(), route.handler.clone(), route.body, hooks.clone())
        };
        let methods = Dispatch::new(
            endpoint
                .routes
                .iter()
                .map(|(method, route)| (method.clone(), chain(route)))
                .collect(),
        );
        let all = endpoint.all.as_ref().map(|route| chain(route));
        let allowed = AllowedMethods::new(endpoint.methods().cloned().collect());
        Self {
            pattern,
            methods,
            all,
            allowed,
        }
    }

    fn chain(&self, method: &Method) -> Option<&Chain> {
        self.methods.get(method).or(self.all.as_ref())
    }
}

/// Immutable, shareable route table produced by [`Router::compile`].
///
/// Lookups only read shared state; every request gets its own parameter map
/// and context, so one `CompiledRouter` can serve any number of concurrent
/// requests behind an `Arc`.
pub struct CompiledRouter {
    endpoints: Vec<CompiledEndpoint>,
    dispatch: Dispatch<Arc<PathMatcher>>,
    // Locations with a catch-all handler, for methods nobody registered.
    any: Option<PathMatcher>,
    // Every routable location, to tell 405 from 404.
    every: Option<PathMatcher>,
    fallbacks: Fallbacks,
}

impl std::fmt::Debug for CompiledRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRouter")
            .field("routes", &self.len())
            .finish_non_exhaustive()
    }
}

impl CompiledRouter {
    /// Finds the route serving `method` at `path`.
    ///
    /// `path` must not carry a query string; use [`Request::path`].
    pub fn find(&self, method: &Method, path: &str) -> Lookup<'_> {
        let matcher = self.dispatch.get(method).map(|matcher| &**matcher).or(self.any.as_ref());
        if let Some(hit) = matcher.and_then(|matcher| matcher.find(path)) {
            let chain = self
                .endpoints
                .get(hit.store.index())
                .and_then(|endpoint| endpoint.chain(method));
            if let Some(chain) = chain {
                return Lookup::Found(RouteMatch {
                    chain,
                    params: hit.values(path).collect(),
                });
            }
        }

        let allowed = self
            .every
            .as_ref()
            .and_then(|every| every.find(path))
            .and_then(|hit| self.endpoints.get(hit.store.index()))
            .map(|endpoint| &endpoint.allowed)
            .filter(|allowed| !allowed.methods().is_empty());
        match allowed {
            Some(allowed) => Lookup::MethodNotAllowed {
                allowed: allowed.clone(),
            },
            None => Lookup::NotFound,
        }
    }

    /// Dispatches `request` and returns the response to send.
    ///
    /// Never fails: unmatched paths go to the not-found handler, disallowed
    /// methods get `405` with an `Allow` header, and errors or panics inside
    /// a route go to the server-error handler.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use rroute::{Request, Response, Router, StatusCode};
    ///
    /// # async fn example() {
    /// let mut router = Router::new();
    /// router.get("/ping", |_ctx| async { Response::new(StatusCode::Ok) }).unwrap();
    /// let router = router.compile();
    ///
    /// let response = router.handle(Request::new("GET", "/ping")).await;
    /// assert_eq!(response.status(), StatusCode::Ok);
    /// # }
    /// ```
    pub async fn handle(&self, request: Request) -> Response {
        let start = Instant::now();
        let method = request.method().clone();

        let lookup = self.find(&method, request.path());
        let (route, response) = match lookup {
            Lookup::Found(found) => {
                let chain = found.chain;
                let ctx = Context::with_params(request, found.params);
                (chain.pattern(), chain.run(ctx, &self.fallbacks).await)
            }
            Lookup::MethodNotAllowed { allowed } => (
                "",
                Response::new(StatusCode::MethodNotAllowed).header("Allow", allowed.header_value()),
            ),
            Lookup::NotFound => ("", self.fallbacks.not_found(Context::new(request)).await),
        };

        debug!(
            method = %method,
            route,
            status = response.status().as_u16(),
            elapsed = ?start.elapsed(),
            "request dispatched"
        );
        response
    }

    /// Number of (method, location) routes, catch-alls included.
    pub fn len(&self) -> usize {
        self.endpoints
            .iter()
            .map(|endpoint| endpoint.allowed.methods().len() + usize::from(endpoint.all.is_some()))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists `(method, pattern)` for every route, `ALL` for catch-alls.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.endpoints.iter().flat_map(|endpoint| {
            endpoint
                .allowed
                .methods()
                .iter()
                .map(Method::as_str)
                .chain(endpoint.all.as_ref().map(|_| "ALL"))
                .map(move |method| (method, &*endpoint.pattern))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Verdict;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn make_request(method: &str, path: &str) -> Request {
        let raw = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        Request::parse(raw.as_bytes()).unwrap()
    }

    fn ok() -> impl IntoHandler {
        |_ctx: Context| async { Response::new(StatusCode::Ok) }
    }

    fn status(code: StatusCode) -> impl IntoHandler {
        move |_ctx: Context| async move { Response::new(code) }
    }

    // Echoes the matched parameters, sorted, as `k=v;k=v`.
    fn echo_params() -> impl IntoHandler {
        |ctx: Context| async move {
            let mut pairs: Vec<String> = ctx.params().iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            pairs.join(";")
        }
    }

    async fn body_of(router: &CompiledRouter, method: &str, path: &str) -> (StatusCode, String) {
        let response = router.handle(make_request(method, path)).await;
        (response.status(), response.text().unwrap_or_default().to_owned())
    }

    // ── Registration ─────────────────────────────────────────────────────────

    #[test]
    fn router_starts_empty() {
        let router = Router::new();
        assert!(router.is_empty());
        assert_eq!(router.len(), 0);
        assert!(Router::default().compile().is_empty());
    }

    #[test]
    fn methods_at_one_path_share_a_location() {
        let mut router = Router::new();
        router.get("/r", ok()).unwrap();
        router.post("/r", ok()).unwrap();
        router.all("/r", ok()).unwrap();
        let endpoint = router.put("r", ok()).unwrap();
        assert_eq!(endpoint.pattern(), "/r");
        assert_eq!(endpoint.methods().count(), 3);
        assert_eq!(router.len(), 4);
    }

    #[test]
    fn conflicting_registration_is_rejected_and_harmless() {
        let mut router = Router::new();
        router.get("/users/:id", ok()).unwrap();
        let err = router.get("/users/:name", ok()).err().unwrap();
        assert!(matches!(err, RouteError::Conflict { .. }));
        assert!(matches!(
            router.get("/a/*/b", ok()).err(),
            Some(RouteError::MisplacedWildcard { .. })
        ));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn allowed_methods_are_ordered() {
        let allowed = AllowedMethods::new(vec![
            Method::from("PURGE"),
            Method::Delete,
            Method::Post,
            Method::Get,
            Method::Post,
        ]);
        assert_eq!(allowed.header_value(), "GET, POST, DELETE, PURGE");
        assert!(allowed.contains(&Method::Delete));
        assert!(!allowed.contains(&Method::Put));
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    #[test]
    fn find_reports_pattern_and_params() {
        let mut router = Router::new();
        router.get("/users/:id/posts/:post", ok()).unwrap();
        let router = router.compile();

        match router.find(&Method::Get, "/users/7/posts/99") {
            Lookup::Found(found) => {
                assert_eq!(found.pattern(), "/users/:id/posts/:post");
                assert_eq!(found.params().get("id"), Some("7"));
                assert_eq!(found.params().get("post"), Some("99"));
            }
            other => panic!("expected a match, got {other:?}"),
        }
        assert!(matches!(router.find(&Method::Get, "/users/7"), Lookup::NotFound));
    }

    #[test]
    fn other_methods_are_not_allowed() {
        let mut router = Router::new();
        router.get("/items", ok()).unwrap();
        router.delete("/items", ok()).unwrap();
        let router = router.compile();

        match router.find(&Method::Put, "/items") {
            Lookup::MethodNotAllowed { allowed } => {
                assert_eq!(allowed.header_value(), "GET, DELETE");
            }
            other => panic!("expected 405, got {other:?}"),
        }
        assert!(matches!(router.find(&Method::Put, "/nothing"), Lookup::NotFound));
    }

    #[test]
    fn method_not_allowed_can_be_disabled() {
        let options = RouterOptions {
            method_not_allowed: false,
            ..RouterOptions::default()
        };
        let mut router = Router::with_options(options);
        router.get("/items", ok()).unwrap();
        let router = router.compile();
        assert!(matches!(router.find(&Method::Post, "/items"), Lookup::NotFound));
    }

    #[test]
    fn method_views_keep_their_own_priorities() {
        let mut router = Router::new();
        router.get("/u/me", ok()).unwrap();
        router.post("/u/:id", ok()).unwrap();
        let router = router.compile();

        // POST does not see the static GET route and falls to the parameter.
        match router.find(&Method::Post, "/u/me") {
            Lookup::Found(found) => assert_eq!(found.pattern(), "/u/:id"),
            other => panic!("expected a match, got {other:?}"),
        }
        match router.find(&Method::Get, "/u/you") {
            Lookup::MethodNotAllowed { allowed } => assert_eq!(allowed.header_value(), "POST"),
            other => panic!("expected 405, got {other:?}"),
        }
    }

    #[test]
    fn routes_lists_every_registration() {
        let mut router = Router::new();
        router.post("/a", ok()).unwrap();
        router.get("/a", ok()).unwrap();
        router.all("/b/*", ok()).unwrap();
        let router = router.compile();
        let routes: Vec<(&str, &str)> = router.routes().collect();
        assert_eq!(routes, vec![("GET", "/a"), ("POST", "/a"), ("ALL", "/b/*")]);
        assert_eq!(router.len(), 3);
    }

    // ── Dispatch ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn empty_router_returns_404() {
        let router = Router::new().compile();
        let res = router.handle(make_request("GET", "/")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn dispatches_static_param_and_wildcard_routes() {
        let mut router = Router::new();
        router.get("/", status(StatusCode::Accepted)).unwrap();
        router.get("/id/:id", echo_params()).unwrap();
        router.get("/files/*", echo_params()).unwrap();
        let router = router.compile();

        assert_eq!(body_of(&router, "GET", "/").await.0, StatusCode::Accepted);
        assert_eq!(body_of(&router, "GET", "/id/42").await.1, "id=42");
        assert_eq!(body_of(&router, "GET", "/id/42?full=1").await.1, "id=42");
        assert_eq!(body_of(&router, "GET", "/files/a/b").await.1, "*=a/b");
        assert_eq!(body_of(&router, "GET", "/missing").await.0, StatusCode::NotFound);
        assert_eq!(body_of(&router, "GET", "/id/").await.0, StatusCode::NotFound);
    }

    #[tokio::test]
    async fn disallowed_method_gets_405_with_allow_header() {
        let mut router = Router::new();
        router.get("/hello", ok()).unwrap();
        let router = router.compile();
        let res = router.handle(make_request("POST", "/hello")).await;
        assert_eq!(res.status(), StatusCode::MethodNotAllowed);
        assert_eq!(res.headers().get("allow"), Some("GET"));
    }

    #[tokio::test]
    async fn last_registration_of_a_method_wins() {
        let mut router = Router::new();
        router.get("/path", ok()).unwrap();
        router.get("/path", status(StatusCode::Accepted)).unwrap();
        assert_eq!(router.len(), 1);
        let router = router.compile();
        assert_eq!(body_of(&router, "GET", "/path").await.0, StatusCode::Accepted);
    }

    #[tokio::test]
    async fn catch_all_serves_unregistered_methods() {
        let mut router = Router::new();
        router.all("/any", status(StatusCode::Accepted)).unwrap();
        router.get("/any", ok()).unwrap();
        router.get("/other", ok()).unwrap();
        let router = router.compile();

        assert_eq!(body_of(&router, "GET", "/any").await.0, StatusCode::Ok);
        assert_eq!(body_of(&router, "POST", "/any").await.0, StatusCode::Accepted);
        assert_eq!(body_of(&router, "PURGE", "/any").await.0, StatusCode::Accepted);
        assert_eq!(body_of(&router, "PURGE", "/other").await.0, StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn every_helper_registers_its_method() {
        let mut router = Router::new();
        router.put("/r", ok()).unwrap();
        router.delete("/r", ok()).unwrap();
        router.patch("/r", ok()).unwrap();
        router.options("/r", ok()).unwrap();
        router.head("/r", ok()).unwrap();
        router.add("PURGE", "/r", ok()).unwrap();
        assert_eq!(router.len(), 6);
        let router = router.compile();
        for method in ["PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "PURGE"] {
            assert_eq!(body_of(&router, method, "/r").await.0, StatusCode::Ok, "{method}");
        }
        assert_eq!(body_of(&router, "GET", "/r").await.0, StatusCode::MethodNotAllowed);
    }

    #[tokio::test]
    async fn hooks_on_a_location_scope_routes_beneath_it() {
        let guarded = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        {
            let guarded = guarded.clone();
            router
                .guard("/admin/*", move |ctx: Context| {
                    guarded.fetch_add(1, AtomicOrdering::SeqCst);
                    async move { Verdict::Reject(ctx) }
                })
                .unwrap()
                .reject(status(StatusCode::Forbidden));
        }
        router.get("/admin", ok()).unwrap();
        router.get("/admin/users/:id", ok()).unwrap();
        router
            .get("/admin/health", ok())
            .unwrap()
            .guard(|ctx: Context| async move { Verdict::Pass(ctx) });
        router.get("/public", ok()).unwrap();
        let router = router.compile();

        assert_eq!(body_of(&router, "GET", "/admin/users/1").await.0, StatusCode::Forbidden);
        assert_eq!(body_of(&router, "GET", "/admin/health").await.0, StatusCode::Ok);
        assert_eq!(body_of(&router, "GET", "/admin").await.0, StatusCode::Ok);
        assert_eq!(body_of(&router, "GET", "/public").await.0, StatusCode::Ok);
        assert_eq!(guarded.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hooks_on_slash_terminated_locations_scope_their_children() {
        let mut router = Router::new();
        router
            .guard("/", |ctx: Context| async move { Verdict::Reject(ctx) })
            .unwrap()
            .reject(status(StatusCode::Unauthorized));
        router
            .guard("/admin/", |ctx: Context| async move { Verdict::Reject(ctx) })
            .unwrap()
            .reject(status(StatusCode::Forbidden));
        router.get("/users", ok()).unwrap();
        router.get("/admin/users", ok()).unwrap();
        router.get("/admin/:id", ok()).unwrap();
        let router = router.compile();

        assert_eq!(body_of(&router, "GET", "/users").await.0, StatusCode::Unauthorized);
        assert_eq!(body_of(&router, "GET", "/admin/users").await.0, StatusCode::Forbidden);
        assert_eq!(body_of(&router, "GET", "/admin/7").await.0, StatusCode::Forbidden);
    }

    #[test]
    fn methods_at_identical_locations_share_a_matcher() {
        let mut router = Router::new();
        for path in ["/items", "/items/:id"] {
            router.get(path, ok()).unwrap();
            router.post(path, ok()).unwrap();
        }
        router.delete("/items/:id", ok()).unwrap();
        let router = router.compile();

        let get = router.dispatch.get(&Method::Get).unwrap();
        let post = router.dispatch.get(&Method::Post).unwrap();
        let delete = router.dispatch.get(&Method::Delete).unwrap();
        assert!(Arc::ptr_eq(get, post));
        assert!(!Arc::ptr_eq(get, delete));
    }

    #[tokio::test]
    async fn nearest_wrap_wins() {
        let mut router = Router::new();
        router
            .wrap("/api", |reply: Reply| {
                reply.into_response().header("X-Layer", "api")
            })
            .unwrap();
        router.get("/api/v1", ok()).unwrap();
        router
            .get("/api/v1/items", ok())
            .unwrap()
            .wrap(|reply: Reply| reply.into_response().header("X-Layer", "items"));
        let router = router.compile();

        let res = router.handle(make_request("GET", "/api/v1")).await;
        assert_eq!(res.headers().get("x-layer"), Some("api"));
        let res = router.handle(make_request("GET", "/api/v1/items")).await;
        assert_eq!(res.headers().get("x-layer"), Some("items"));
        // A location with hooks but no handler is not itself routable.
        let res = router.handle(make_request("GET", "/api")).await;
        assert_eq!(res.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn fallbacks_are_configurable() {
        let mut router = Router::new();
        router
            .not_found(|ctx: Context| async move { format!("no route for {}", ctx.path()) })
            .bad_request(|_ctx: &Context, _err: &BodyError| Response::new(StatusCode::UnprocessableEntity))
            .server_error(|err: &HandlerError| Response::new(StatusCode::ServiceUnavailable).body(err.to_string()));
        router
            .add_parsed(Method::Post, "/json", BodyKind::Json, ok())
            .unwrap();
        router
            .get("/fail", |_ctx| async { Err::<Response, _>("exploded") })
            .unwrap();
        let router = router.compile();

        assert_eq!(
            body_of(&router, "GET", "/nowhere").await,
            (StatusCode::Ok, "no route for /nowhere".to_owned())
        );
        assert_eq!(
            body_of(&router, "GET", "/fail").await,
            (StatusCode::ServiceUnavailable, "exploded".to_owned())
        );

        let raw = b"POST /json HTTP/1.1\r\nContent-Length: 5\r\n\r\n{bad}";
        let res = router.handle(Request::parse(raw).unwrap()).await;
        assert_eq!(res.status(), StatusCode::UnprocessableEntity);
    }

    #[tokio::test]
    async fn parsed_body_is_visible_to_handler() {
        let mut router = Router::new();
        router
            .add_parsed(Method::Post, "/forms", BodyKind::Form, |ctx: Context| async move {
                ctx.body().form_field("name").unwrap_or("?").to_owned()
            })
            .unwrap();
        let router = router.compile();
        let request = Request::new("POST", "/forms")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("name=ada");
        let res = router.handle(request).await;
        assert_eq!(res.text(), Some("ada"));
    }
}
