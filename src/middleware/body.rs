//! Size-limited body parsers.
//!
//! Each parser only acts on its own content type and leaves every other
//! request untouched. Oversized bodies are answered `413`, malformed ones
//! `400`, both with the usual error envelope.

use async_trait::async_trait;
use http::StatusCode;
use serde_json::{Map, Value};

use super::{Middleware, Next};
use crate::error::{Error, ErrorEnvelope};
use crate::handler::HandlerResult;
use crate::request::Request;
use crate::response::Response;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Format {
    UrlEncoded,
    Json,
}

impl Format {
    fn accepts(self, content_type: &str) -> bool {
        match self {
            Self::UrlEncoded => content_type == "application/x-www-form-urlencoded",
            Self::Json => content_type == "application/json" || content_type.ends_with("+json"),
        }
    }

    fn parse(self, bytes: &[u8]) -> Option<Value> {
        if bytes.is_empty() {
            return Some(Value::Object(Map::new()));
        }
        match self {
            Self::Json => serde_json::from_slice(bytes).ok(),
            Self::UrlEncoded => serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
                .ok()
                .map(|pairs| {
                    Value::Object(pairs.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
                }),
        }
    }
}

/// Reads and parses bodies of one content type, up to `limit` bytes.
pub struct BodyParser {
    format: Format,
    limit: usize,
}

impl BodyParser {
    pub fn urlencoded(limit: usize) -> Self {
        Self { format: Format::UrlEncoded, limit }
    }

    pub fn json(limit: usize) -> Self {
        Self { format: Format::Json, limit }
    }

    pub fn limit(&self) -> usize { self.limit }
}

#[async_trait]
impl Middleware for BodyParser {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        let accepted = req.content_type().is_some_and(|ct| self.format.accepts(&ct));
        if !accepted {
            return next.run(req, res).await;
        }

        let bytes = match req.read_body(self.limit).await {
            Ok(bytes) => bytes,
            Err(Error::PayloadTooLarge { limit }) => {
                tracing::debug!(limit, path = req.path(), "request body too large");
                res.status(StatusCode::PAYLOAD_TOO_LARGE)
                    .json(&ErrorEnvelope::new("PayloadTooLarge", "request entity too large"))?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match self.format.parse(&bytes) {
            Some(value) => {
                req.set_body_value(value);
                next.run(req, res).await
            }
            None => {
                tracing::debug!(format = ?self.format, path = req.path(), "malformed request body");
                res.status(StatusCode::BAD_REQUEST)
                    .json(&ErrorEnvelope::new("BadRequest", "malformed request body"))?;
                Ok(())
            }
        }
    }
}
