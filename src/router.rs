//! Routes and sub-routers.
//!
//! Two kinds of route-table entries exist. A [`Route`] is a single
//! `(method, path, handler)` triple and becomes its own pipeline stage, so
//! explicit routes are tried strictly in registration order. A [`Router`] is
//! a pre-built bundle (one radix tree per HTTP method, O(path-length)
//! lookup) mounted as one opaque stage; within it the radix tree decides.
//!
//! Both fall through to the next stage when nothing matches, and both run
//! their handler through [`invoke`], which scopes a logger to the invocation.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use matchit::Router as MatchitRouter;
use serde_json::Map;

use crate::config::LogLevel;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, HandlerResult, boxed};
use crate::method::Method;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

// ── Route ─────────────────────────────────────────────────────────────────────

/// One explicit route. Immutable once built; identified by `(method, path)`.
pub struct Route {
    method: Method,
    path: String,
    matcher: MatchitRouter<()>,
    handler: BoxedHandler,
}

impl Route {
    pub fn new(method: Method, path: &str, handler: BoxedHandler) -> Result<Self, Error> {
        let mut matcher = MatchitRouter::new();
        matcher.insert(path, ()).map_err(|e| Error::InvalidRoute {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self { method, path: path.to_owned(), matcher, handler })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }

    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[async_trait]
impl Middleware for Route {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        if !self.method.matches(req.method()) {
            return next.run(req, res).await;
        }
        let params = self.matcher.at(req.path()).ok().map(|m| collect_params(&m.params));
        let Some(params) = params else {
            return next.run(req, res).await;
        };
        req.set_params(params);
        invoke(&self.label(), &self.handler, req, res).await
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct Endpoint {
    label: String,
    handler: BoxedHandler,
}

/// A pre-built bundle of routes, mounted as a single unit.
///
/// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
///
/// ```rust
/// use restlayer::{Method, Router};
///
/// let users = Router::new()
///     .on(Method::Get, "/users/{id}", |req, res| Box::pin(async move {
///         let id = req.param("id").unwrap_or_default().to_owned();
///         res.json(&serde_json::json!({ "id": id }))
///     }))
///     .on(Method::Delete, "/users/{id}", |_req, res| Box::pin(async move {
///         res.end();
///         Ok(())
///     }));
/// ```
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Endpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new() }
    }

    /// Registers a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid pattern or conflicts with a path
    /// already registered for `method`. Use [`Router::try_on`] to handle that.
    pub fn on<F>(self, method: Method, path: &str, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.try_on(method, path, boxed(handler))
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Fallible form of [`Router::on`] taking an already-erased handler.
    pub fn try_on(mut self, method: Method, path: &str, handler: BoxedHandler) -> Result<Self, Error> {
        let endpoint = Endpoint { label: format!("{method} {path}"), handler };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, endpoint)
            .map_err(|e| Error::InvalidRoute { path: path.to_owned(), reason: e.to_string() })?;
        Ok(self)
    }

    fn lookup(&self, method: &http::Method, path: &str) -> Option<(Endpoint, HashMap<String, String>)> {
        let method = Method::try_from(method).ok()?;
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        Some((matched.value.clone(), collect_params(&matched.params)))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl Middleware for Router {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        match self.lookup(req.method(), req.path()) {
            Some((endpoint, params)) => {
                req.set_params(params);
                invoke(&endpoint.label, &endpoint.handler, req, res).await
            }
            None => next.run(req, res).await,
        }
    }
}

fn collect_params(params: &matchit::Params<'_, '_>) -> HashMap<String, String> {
    params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect()
}

// ── Invocation ────────────────────────────────────────────────────────────────

/// Runs one handler under a route-invocation log scope.
///
/// Logs "executing route" / "executed route", or "error executing route" with
/// the error attached. Panics are caught and surface as [`Error::Panicked`].
/// Errors are returned unchanged so the terminal error handler sees them.
pub(crate) async fn invoke(
    label: &str,
    handler: &BoxedHandler,
    req: &mut Request,
    res: &mut Response,
) -> HandlerResult {
    let scope = req.ensure_context().scope().for_route(label);
    scope.log(LogLevel::Info, "executing route", Map::new());
    req.set_route_scope(Some(scope.clone()));

    let outcome = AssertUnwindSafe(handler.call(req, res)).catch_unwind().await;
    req.set_route_scope(None);

    let result = outcome.unwrap_or_else(|panic| Err(Error::Panicked(panic_message(panic.as_ref()))));
    match &result {
        Ok(()) => scope.log(LogLevel::Info, "executed route", Map::new()),
        Err(e) => scope.error("error executing route", e, Map::new()),
    }
    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
