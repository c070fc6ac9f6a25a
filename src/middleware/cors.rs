//! Permissive CORS.
//!
//! Every response gets `Access-Control-Allow-Origin`. Preflight requests
//! (`OPTIONS` carrying `Access-Control-Request-Method`) are answered `204`
//! directly and never reach a route.

use async_trait::async_trait;
use http::StatusCode;
use http::header::{self, HeaderValue};

use super::{Middleware, Next};
use crate::handler::HandlerResult;
use crate::request::Request;
use crate::response::Response;

const DEFAULT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

pub struct Cors {
    allow_origin: HeaderValue,
    allow_methods: HeaderValue,
}

impl Default for Cors {
    /// Any origin, the six routable methods, requested headers reflected.
    fn default() -> Self {
        Self {
            allow_origin: HeaderValue::from_static("*"),
            allow_methods: HeaderValue::from_static(DEFAULT_METHODS),
        }
    }
}

impl Cors {
    /// Restricts `Access-Control-Allow-Origin` to a single origin.
    pub fn with_origin(origin: HeaderValue) -> Self {
        Self { allow_origin: origin, ..Self::default() }
    }
}

#[async_trait]
impl Middleware for Cors {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        res.header(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        if self.allow_origin != "*" {
            res.header(header::VARY, HeaderValue::from_static("Origin"));
        }

        let preflight = req.method() == http::Method::OPTIONS
            && req.headers().contains_key(header::ACCESS_CONTROL_REQUEST_METHOD);
        if !preflight {
            return next.run(req, res).await;
        }

        res.header(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        if let Some(requested) = req.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS).cloned() {
            res.header(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
        }
        res.status(StatusCode::NO_CONTENT).end();
        Ok(())
    }
}
