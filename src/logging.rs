//! Per-request correlation and scoped structured logging.
//!
//! A [`LogScope`] is an explicit value: the request-id stage creates one per
//! request and stores it in the [`RequestContext`]; each route invocation
//! derives a child scope with its own call id. Nothing here is global, so
//! two in-flight requests can never observe each other's ids.

use std::fmt;
use std::time::{Duration, Instant};

use http::StatusCode;
use serde_json::{Map, Value};
use tracing::Span;
use uuid::Uuid;

use crate::config::LogLevel;

/// Successful payloads whose serialized form reaches this many characters
/// are left out of the completion log entry.
pub const RESPONSE_LOG_CEILING: usize = 8192;

macro_rules! scoped_event {
    ($scope:expr, $level:expr, $($rest:tt)+) => {
        match $level {
            LogLevel::Trace => tracing::event!(parent: &$scope.span, tracing::Level::TRACE, $($rest)+),
            LogLevel::Debug => tracing::event!(parent: &$scope.span, tracing::Level::DEBUG, $($rest)+),
            LogLevel::Info  => tracing::event!(parent: &$scope.span, tracing::Level::INFO,  $($rest)+),
            LogLevel::Warn  => tracing::event!(parent: &$scope.span, tracing::Level::WARN,  $($rest)+),
            LogLevel::Error => tracing::event!(parent: &$scope.span, tracing::Level::ERROR, $($rest)+),
        }
    };
}

/// A logger bound to one request and, optionally, one route invocation.
#[derive(Clone, Debug)]
pub struct LogScope {
    span: Span,
    request_id: Uuid,
    route: Option<String>,
    call_id: Option<Uuid>,
}

impl LogScope {
    pub fn for_request(request_id: Uuid) -> Self {
        Self {
            span: tracing::info_span!("request", request_id = %request_id),
            request_id,
            route: None,
            call_id: None,
        }
    }

    /// Nested scope for one invocation of `route`, tagged with a fresh call id.
    pub fn for_route(&self, route: &str) -> Self {
        let call_id = Uuid::new_v4();
        Self {
            span: tracing::info_span!(parent: &self.span, "route", route = %route, call_id = %call_id),
            request_id: self.request_id,
            route: Some(route.to_owned()),
            call_id: Some(call_id),
        }
    }

    pub fn request_id(&self) -> Uuid { self.request_id }
    pub fn call_id(&self) -> Option<Uuid> { self.call_id }
    pub fn route(&self) -> Option<&str> { self.route.as_deref() }
    pub fn span(&self) -> &Span { &self.span }

    /// Emits `message` at `level` with `fields` attached as a JSON object.
    pub fn log(&self, level: LogLevel, message: &str, fields: Map<String, Value>) {
        let fields = Value::Object(fields);
        scoped_event!(
            self,
            level,
            request_id = %self.request_id,
            call_id = %Maybe(&self.call_id),
            route = %Maybe(&self.route),
            fields = %fields,
            "{message}"
        );
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message, Map::new());
    }

    /// Emits `message` at error level with the full error chain attached.
    pub fn error(&self, message: &str, err: &(dyn std::error::Error + 'static), fields: Map<String, Value>) {
        let fields = Value::Object(fields);
        let chain = ErrorChain(err);
        tracing::event!(
            parent: &self.span,
            tracing::Level::ERROR,
            request_id = %self.request_id,
            call_id = %Maybe(&self.call_id),
            route = %Maybe(&self.route),
            fields = %fields,
            error = %chain,
            "{message}"
        );
    }
}

/// Ephemeral per-request state created by the request-id stage.
#[derive(Clone, Debug)]
pub struct RequestContext {
    id: Uuid,
    scope: LogScope,
    started: Instant,
}

impl RequestContext {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        Self { id, scope: LogScope::for_request(id), started: Instant::now() }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn scope(&self) -> &LogScope { &self.scope }
    pub fn elapsed(&self) -> Duration { self.started.elapsed() }
}

impl Default for RequestContext {
    fn default() -> Self { Self::new() }
}

/// Decides whether a recorded payload goes into the completion log entry.
///
/// Error statuses are always logged in full; anything else is dropped once
/// its serialized form reaches [`RESPONSE_LOG_CEILING`] characters.
pub fn loggable_payload(status: StatusCode, payload: &Value) -> Option<Value> {
    if status.is_client_error() || status.is_server_error() {
        return Some(payload.clone());
    }
    let size = payload.to_string().chars().count();
    (size < RESPONSE_LOG_CEILING).then(|| payload.clone())
}

struct Maybe<'a, T>(&'a Option<T>);

impl<T: fmt::Display> fmt::Display for Maybe<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => v.fmt(f),
            None => f.write_str("-"),
        }
    }
}

struct ErrorChain<'a>(&'a (dyn std::error::Error + 'static));

impl fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
