//! The assembled request-handling graph.
//!
//! A [`Pipeline`] is an immutable, ordered list of [`Stage`]s followed by the
//! terminal error handler. It is produced by [`App::build`](crate::App::build)
//! and can be driven in-process, without a socket, through
//! [`Pipeline::handle`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::Full;
use serde_json::Map;

use crate::error::{BoxError, Error, ErrorEnvelope};
use crate::middleware::{Next, Stage};
use crate::request::Request;
use crate::response::Response;

/// Label reported by [`Pipeline::stage_names`] for the terminal error handler.
pub const ERROR_HANDLER_STAGE: &str = "error-handler";

/// Stages the framework injects, grouped by the slot they occupy.
#[derive(Default)]
pub struct FrameworkStages {
    /// Trust-proxy, CORS, compression and session, as enabled.
    pub toggles: Vec<Stage>,
    /// URL-encoded then JSON body parsers.
    pub parsers: Vec<Stage>,
    /// Request id, request logger, response instrumentation, response logger.
    pub pre_route: Vec<Stage>,
}

/// Stages registered by the caller, each list in registration order.
#[derive(Default)]
pub struct CallerStages {
    pub uses: Vec<Stage>,
    pub pre_route: Vec<Stage>,
    /// Explicit routes and mounted routers, interleaved as registered.
    pub routes: Vec<Stage>,
    pub post_route: Vec<Stage>,
}

/// Merges the two sequences into execution order:
///
/// 1. caller `uses`
/// 2. framework toggles
/// 3. framework body parsers
/// 4. caller pre-route middleware
/// 5. framework pre-route stages
/// 6. caller routes and routers
/// 7. caller post-route middleware
///
/// The terminal error handler always follows.
pub fn build_pipeline(framework: FrameworkStages, caller: CallerStages) -> Pipeline {
    let stages = caller
        .uses
        .into_iter()
        .chain(framework.toggles)
        .chain(framework.parsers)
        .chain(caller.pre_route)
        .chain(framework.pre_route)
        .chain(caller.routes)
        .chain(caller.post_route)
        .collect();
    Pipeline::new(stages)
}

/// Ordered stages plus the terminal error handler. Cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Stage]>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages: stages.into() }
    }

    /// Stage labels in execution order, ending with the error handler.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .map(Stage::name)
            .chain(std::iter::once(ERROR_HANDLER_STAGE))
            .collect()
    }

    /// Runs one request through every stage and returns the wire response.
    ///
    /// Errors escaping the stages go to the terminal error handler. A request
    /// that nothing answered gets `404` with an empty body. Response-finish
    /// listeners fire last.
    pub async fn handle<B>(&self, req: http::Request<B>, remote_addr: Option<SocketAddr>) -> http::Response<Full<Bytes>>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let mut req = Request::from_http(req, remote_addr);
        let mut res = Response::new();

        if let Err(err) = Next::new(Arc::clone(&self.stages)).run(&mut req, &mut res).await {
            handle_error(&req, &mut res, &err);
        }
        if !res.is_sent() {
            res.status(StatusCode::NOT_FOUND).end();
        }
        res.finish(&req)
    }
}

/// Logs `err` with the request's correlation ids and, if nothing has been
/// sent yet, answers `500` with the generic envelope.
fn handle_error(req: &Request, res: &mut Response, err: &Error) {
    match req.log() {
        Some(scope) => scope.error("unhandled error", err, Map::new()),
        None => tracing::error!(method = %req.method(), path = req.path(), "unhandled error: {err}"),
    }
    if res.is_sent() {
        return;
    }
    if let Err(e) = res
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .json(&ErrorEnvelope::overall_exception())
    {
        tracing::error!("failed to write error envelope: {e}");
    }
}
