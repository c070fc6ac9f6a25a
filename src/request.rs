//! Incoming HTTP request type.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::{Extensions, HeaderMap, Uri, header};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Limited};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{BoxError, Error};
use crate::logging::{LogScope, RequestContext};

pub(crate) type RawBody = UnsyncBoxBody<Bytes, BoxError>;

enum BodyState {
    Pending(RawBody),
    Buffered(Bytes),
}

/// An incoming HTTP request as it travels through the pipeline.
///
/// The body is read lazily: the body-parser stages pull it through a size
/// limit, after which [`body`](Request::body) and
/// [`body_value`](Request::body_value) expose the buffered bytes and the
/// parsed document.
pub struct Request {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: BodyState,
    parsed: Value,
    params: HashMap<String, String>,
    remote_addr: Option<SocketAddr>,
    ip: Option<IpAddr>,
    protocol: String,
    context: Option<RequestContext>,
    route_scope: Option<LogScope>,
    extensions: Extensions,
}

impl Request {
    /// Wraps an `http::Request` with any body type.
    pub fn from_http<B>(req: http::Request<B>, remote_addr: Option<SocketAddr>) -> Self
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let protocol = parts.uri.scheme_str().unwrap_or("http").to_owned();
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body: BodyState::Pending(body.map_err(Into::into).boxed_unsync()),
            parsed: Value::Null,
            params: HashMap::new(),
            remote_addr,
            ip: remote_addr.map(|a| a.ip()),
            protocol,
            context: None,
            route_scope: None,
            extensions: parts.extensions,
        }
    }

    /// Bodiless request, mostly useful in tests.
    pub fn empty(method: http::Method, uri: &str) -> Result<Self, Error> {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Empty::<Bytes>::new())
            .map_err(Error::handler)?;
        Ok(Self::from_http(req, None))
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Path plus query string, as the client sent it.
    pub fn url(&self) -> &str {
        self.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// Header lookup by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> { &self.params }

    pub(crate) fn set_params(&mut self, params: HashMap<String, String>) {
        self.params = params;
    }

    /// Client address: the socket peer, or the forwarded client when the
    /// trust-proxy stage is active.
    pub fn ip(&self) -> Option<IpAddr> { self.ip }

    /// `http` or `https`, proxy-aware like [`ip`](Request::ip).
    pub fn protocol(&self) -> &str { &self.protocol }

    pub(crate) fn set_forwarded(&mut self, ip: Option<IpAddr>, protocol: Option<String>) {
        if ip.is_some() {
            self.ip = ip;
        }
        if let Some(protocol) = protocol {
            self.protocol = protocol;
        }
    }

    /// Buffered body bytes; empty until a parser (or
    /// [`read_body`](Request::read_body)) has consumed the stream.
    pub fn body(&self) -> &[u8] {
        match &self.body {
            BodyState::Buffered(bytes) => bytes,
            BodyState::Pending(_) => &[],
        }
    }

    /// Reads the whole body, failing once more than `limit` bytes arrive.
    /// Subsequent calls return the buffered bytes.
    pub async fn read_body(&mut self, limit: usize) -> Result<Bytes, Error> {
        let declared = self
            .header(header::CONTENT_LENGTH.as_str())
            .and_then(|v| v.parse::<usize>().ok());
        let body = match std::mem::replace(&mut self.body, BodyState::Buffered(Bytes::new())) {
            BodyState::Buffered(bytes) => {
                self.body = BodyState::Buffered(bytes.clone());
                return Ok(bytes);
            }
            BodyState::Pending(body) => body,
        };
        if declared.is_some_and(|len| len > limit) {
            return Err(Error::PayloadTooLarge { limit });
        }
        let collect: std::pin::Pin<
            Box<dyn Future<Output = Result<http_body_util::Collected<Bytes>, BoxError>> + Send>,
        > = Box::pin(Limited::new(body, limit).collect());
        let collected = collect.await.map_err(|e: BoxError| {
            if e.is::<http_body_util::LengthLimitError>() {
                Error::PayloadTooLarge { limit }
            } else {
                Error::Body(e)
            }
        })?;
        let bytes = collected.to_bytes();
        self.body = BodyState::Buffered(bytes.clone());
        Ok(bytes)
    }

    /// Parsed body document (`null` when no parser matched).
    pub fn body_value(&self) -> &Value { &self.parsed }

    pub(crate) fn set_body_value(&mut self, value: Value) {
        self.parsed = value;
    }

    /// Deserializes the parsed body into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(T::deserialize(&self.parsed)?)
    }

    /// Correlation context, present once the request-id stage has run.
    pub fn context(&self) -> Option<&RequestContext> { self.context.as_ref() }

    pub(crate) fn ensure_context(&mut self) -> &RequestContext {
        self.context.get_or_insert_with(RequestContext::new)
    }

    /// The most specific logger available: the route invocation scope inside a
    /// handler, otherwise the request scope.
    pub fn log(&self) -> Option<&LogScope> {
        self.route_scope
            .as_ref()
            .or_else(|| self.context.as_ref().map(RequestContext::scope))
    }

    pub(crate) fn set_route_scope(&mut self, scope: Option<LogScope>) {
        self.route_scope = scope;
    }

    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }
}
