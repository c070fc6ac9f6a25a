//! Outgoing HTTP response: the [`ResponseWriter`] seam and the [`Response`]
//! handle passed to middleware and handlers.
//!
//! Handlers never build wire responses directly. They call the four
//! response-producing operations on [`Response`] (`status`, `json`, `send`,
//! `redirect`), which forward to a boxed [`ResponseWriter`]. The writer is
//! normally a [`NativeResponse`]; the instrumentation stage decorates it with
//! a [`Recorder`](crate::instrument::Recorder) so every outcome is observed
//! without touching the bytes.

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;
use crate::instrument::Recorded;
use crate::request::Request;

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// The response-producing operations, as an object-safe interface.
///
/// Implementations must be usable in any call order; the last send wins.
pub trait ResponseWriter: Send {
    fn set_status(&mut self, status: StatusCode);
    fn send_json(&mut self, body: Value);
    fn send_raw(&mut self, body: Bytes);
    fn redirect(&mut self, location: &str);

    /// The response as it will go on the wire.
    fn native(&self) -> &NativeResponse;
    fn native_mut(&mut self) -> &mut NativeResponse;

    /// What an instrumenting decorator has observed, if one is installed.
    fn recorded(&self) -> Option<&Recorded> { None }

    fn into_native(self: Box<Self>) -> NativeResponse;
}

// ── NativeResponse ────────────────────────────────────────────────────────────

/// Buffered wire response. Defaults to `200 OK` with no body.
#[derive(Debug)]
pub struct NativeResponse {
    status: StatusCode,
    explicit_status: bool,
    headers: HeaderMap,
    body: Bytes,
    sent: bool,
    redirected: bool,
}

impl Default for NativeResponse {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            explicit_status: false,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            sent: false,
            redirected: false,
        }
    }
}

impl NativeResponse {
    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn is_sent(&self) -> bool { self.sent }

    /// Replaces the body bytes without marking the response as sent.
    /// Used by transport stages such as compression.
    pub fn replace_body(&mut self, body: Bytes) {
        self.body = body;
    }

    fn finish_send(&mut self, content_type: &'static str, body: Bytes) {
        // A send after a redirect replaces it.
        if self.redirected {
            self.headers.remove(header::LOCATION);
            if !self.explicit_status {
                self.status = StatusCode::OK;
            }
            self.redirected = false;
        }
        if !body.is_empty() {
            self.headers
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(content_type));
        }
        self.body = body;
        self.sent = true;
    }

    pub fn into_http(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for NativeResponse {
    fn set_status(&mut self, status: StatusCode) {
        self.status = status;
        self.explicit_status = true;
    }

    fn send_json(&mut self, body: Value) {
        self.finish_send(JSON, Bytes::from(body.to_string()));
    }

    fn send_raw(&mut self, body: Bytes) {
        self.finish_send(TEXT, body);
    }

    fn redirect(&mut self, location: &str) {
        if !self.explicit_status {
            self.status = StatusCode::FOUND;
        }
        match HeaderValue::try_from(location) {
            Ok(value) => {
                self.headers.insert(header::LOCATION, value);
            }
            Err(_) => tracing::warn!(location, "dropping unencodable redirect location"),
        }
        self.body = Bytes::new();
        self.sent = true;
        self.redirected = true;
    }

    fn native(&self) -> &NativeResponse { self }
    fn native_mut(&mut self) -> &mut NativeResponse { self }
    fn into_native(self: Box<Self>) -> NativeResponse { *self }
}

// ── Response ─────────────────────────────────────────────────────────────────

type FinishListener = Box<dyn FnOnce(&Request, &Response) + Send>;

/// The response handle every middleware and handler writes to.
///
/// ```rust
/// use restlayer::Response;
/// use http::StatusCode;
///
/// let mut res = Response::new();
/// res.status(StatusCode::CREATED).json(&serde_json::json!({ "id": 42 })).unwrap();
/// assert_eq!(res.status_code(), StatusCode::CREATED);
/// ```
pub struct Response {
    writer: Box<dyn ResponseWriter>,
    on_finish: Vec<FinishListener>,
}

impl Response {
    pub fn new() -> Self {
        Self::with_writer(Box::new(NativeResponse::default()))
    }

    pub fn with_writer(writer: Box<dyn ResponseWriter>) -> Self {
        Self { writer, on_finish: Vec::new() }
    }

    /// Sets the status code. Returns `self` so a send can be chained.
    pub fn status(&mut self, code: StatusCode) -> &mut Self {
        self.writer.set_status(code);
        self
    }

    /// Sends `body` as JSON. Fails only if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(&mut self, body: &T) -> Result<(), Error> {
        let value = serde_json::to_value(body)?;
        self.writer.send_json(value);
        Ok(())
    }

    /// Sends raw bytes (`text/plain` unless a content type is already set).
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.writer.send_raw(body.into());
    }

    /// Sends an empty body with the current status.
    pub fn end(&mut self) {
        self.writer.send_raw(Bytes::new());
    }

    /// Redirects to `location` (`302` unless a status was set first).
    pub fn redirect(&mut self, location: &str) {
        self.writer.redirect(location);
    }

    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.writer.native_mut().headers_mut().insert(name, value);
        self
    }

    pub fn headers(&self) -> &HeaderMap { self.writer.native().headers() }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { self.writer.native_mut().headers_mut() }
    pub fn status_code(&self) -> StatusCode { self.writer.native().status() }
    pub fn body(&self) -> &Bytes { self.writer.native().body() }
    pub fn is_sent(&self) -> bool { self.writer.native().is_sent() }

    pub fn native_mut(&mut self) -> &mut NativeResponse { self.writer.native_mut() }

    /// Instrumentation record, if a recorder has been installed.
    pub fn recorded(&self) -> Option<&Recorded> { self.writer.recorded() }

    /// Wraps the current writer in a decorator.
    pub fn decorate(&mut self, wrap: impl FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>) {
        let inner = std::mem::replace(&mut self.writer, Box::new(NativeResponse::default()));
        self.writer = wrap(inner);
    }

    /// Registers a listener fired once, after the whole pipeline (including
    /// the error handler) has finished and before the bytes are written.
    pub fn on_finish(&mut self, listener: impl FnOnce(&Request, &Response) + Send + 'static) {
        self.on_finish.push(Box::new(listener));
    }

    pub(crate) fn finish(mut self, req: &Request) -> http::Response<Full<Bytes>> {
        for listener in std::mem::take(&mut self.on_finish) {
            listener(req, &self);
        }
        self.writer.into_native().into_http()
    }
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}
