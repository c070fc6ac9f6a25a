//! Framework-owned pre-route stages.
//!
//! These always run, in this order, right after caller pre-route middleware:
//! request id → request log → response instrumentation → response log.
//! They touch only framework state and never fail.

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue};
use serde_json::{Map, Value, json};

use super::{Middleware, Next};
use crate::config::{LogDataCallback, LogLevel};
use crate::handler::HandlerResult;
use crate::instrument::Recorder;
use crate::logging::loggable_payload;
use crate::request::Request;
use crate::response::Response;

/// Response header echoing the correlation id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Assigns the correlation id and request log scope.
pub struct RequestId;

#[async_trait]
impl Middleware for RequestId {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        let id = req.ensure_context().id();
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            res.header(REQUEST_ID_HEADER, value);
        }
        next.run(req, res).await
    }
}

/// Emits "request received".
pub struct RequestLogger {
    level: LogLevel,
    data: Option<LogDataCallback>,
}

impl RequestLogger {
    pub fn new(level: LogLevel, data: Option<LogDataCallback>) -> Self {
        Self { level, data }
    }
}

#[async_trait]
impl Middleware for RequestLogger {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        let scope = req.ensure_context().scope().clone();
        let mut fields = Map::new();
        fields.insert("method".into(), json!(req.method().as_str()));
        fields.insert("url".into(), json!(req.url()));
        fields.insert("body".into(), req.body_value().clone());
        if let Some(data) = &self.data {
            fields.extend(data(&*req));
        }
        scope.log(self.level, "request received", fields);
        next.run(req, res).await
    }
}

/// Installs the [`Recorder`] decorator on the response.
pub struct ResponseInstrumentation;

#[async_trait]
impl Middleware for ResponseInstrumentation {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        res.decorate(|inner| Box::new(Recorder::new(inner)));
        next.run(req, res).await
    }
}

/// Emits "request completed" once the response is finished.
pub struct ResponseLogger {
    level: LogLevel,
    data: Option<LogDataCallback>,
}

impl ResponseLogger {
    pub fn new(level: LogLevel, data: Option<LogDataCallback>) -> Self {
        Self { level, data }
    }
}

#[async_trait]
impl Middleware for ResponseLogger {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        let scope = req.ensure_context().scope().clone();
        let level = self.level;
        let data = self.data.clone();
        res.on_finish(move |req, res| {
            let fields = completion_fields(req, res, data.as_ref());
            scope.log(level, "request completed", fields);
        });
        next.run(req, res).await
    }
}

fn completion_fields(req: &Request, res: &Response, data: Option<&LogDataCallback>) -> Map<String, Value> {
    let recorded = res.recorded();
    let status = recorded.and_then(|r| r.status()).unwrap_or_else(|| res.status_code());

    let mut fields = Map::new();
    fields.insert("method".into(), json!(req.method().as_str()));
    fields.insert("url".into(), json!(req.url()));
    fields.insert("status".into(), json!(status.as_u16()));
    if let Some(ctx) = req.context() {
        let millis = u64::try_from(ctx.elapsed().as_millis()).unwrap_or(u64::MAX);
        fields.insert("durationMs".into(), json!(millis));
    }
    if let Some(recorded) = recorded {
        if let Some(payload) = recorded.payload() {
            match loggable_payload(status, payload) {
                Some(body) => fields.insert("body".into(), body),
                None => fields.insert("bodyOmitted".into(), Value::Bool(true)),
            };
        }
        if let Some(location) = recorded.redirect() {
            fields.insert("redirect".into(), json!(location));
        }
    }
    if let Some(data) = data {
        fields.extend(data(req));
    }
    fields
}
