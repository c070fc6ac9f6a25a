//! Middleware layer.
//!
//! A middleware stage receives the request, the response handle, and a
//! [`Next`] continuation. It may inspect or modify either side, then either
//! call `next.run(req, res).await` to proceed or return without calling it to
//! short-circuit (after sending a response). Errors returned from any stage
//! skip the rest of the chain and land in the terminal error handler.
//!
//! Built-in stages:
//! - [`framework`]: request id, request log, response instrumentation, response log
//! - [`body`]: size-limited URL-encoded and JSON parsers
//! - [`cors`], [`compression`], [`proxy`]: configuration toggles

use std::sync::Arc;

use async_trait::async_trait;

use crate::handler::{BoxFuture, HandlerResult};
use crate::request::Request;
use crate::response::Response;

pub mod body;
pub mod compression;
pub mod cors;
pub mod framework;
pub mod proxy;

/// A pipeline stage.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult;
}

/// A type-erased middleware shared by every request.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// A labelled entry in the assembled pipeline.
#[derive(Clone)]
pub struct Stage {
    name: String,
    middleware: BoxedMiddleware,
}

impl Stage {
    pub fn new(name: impl Into<String>, middleware: BoxedMiddleware) -> Self {
        Self { name: name.into(), middleware }
    }

    pub fn name(&self) -> &str { &self.name }
}

/// The remainder of the pipeline after the current stage.
///
/// Owns a handle on the shared stage list, so a stage may keep it across
/// its own awaits.
#[derive(Clone)]
pub struct Next {
    stages: Arc<[Stage]>,
    index: usize,
}

impl Next {
    pub(crate) fn new(stages: Arc<[Stage]>) -> Self {
        Self { stages, index: 0 }
    }

    /// Runs the next stage. Past the last stage this is a no-op.
    pub async fn run(self, req: &mut Request, res: &mut Response) -> HandlerResult {
        let Some(middleware) = self.stages.get(self.index).map(|s| Arc::clone(&s.middleware)) else {
            return Ok(());
        };
        let rest = Next { stages: self.stages, index: self.index + 1 };
        middleware.handle(req, res, rest).await
    }
}

/// Middleware built from a function, see [`from_fn`].
pub struct FromFn<F>(F);

/// Turns a function into middleware.
///
/// ```rust
/// use restlayer::middleware::from_fn;
///
/// let timing = from_fn(|req, res, next| Box::pin(async move {
///     let started = std::time::Instant::now();
///     let result = next.run(req, res).await;
///     tracing::debug!(elapsed = ?started.elapsed(), "stage done");
///     result
/// }));
/// ```
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    FromFn(f)
}

#[async_trait]
impl<F> Middleware for FromFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, Next) -> BoxFuture<'a, HandlerResult>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        (self.0)(req, res, next).await
    }
}
