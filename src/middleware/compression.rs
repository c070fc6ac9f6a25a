//! gzip response compression.
//!
//! Runs after the rest of the pipeline has produced the response and
//! compresses the buffered body when the client accepts gzip, the body is
//! large enough to be worth it, and the content type is textual.

use std::io::Write;

use async_trait::async_trait;
use bytes::Bytes;
use flate2::Compression as Level;
use flate2::write::GzEncoder;
use http::header::{self, HeaderValue};

use super::{Middleware, Next};
use crate::handler::HandlerResult;
use crate::request::Request;
use crate::response::Response;

/// Bodies smaller than this are sent as-is.
pub const COMPRESSION_THRESHOLD: usize = 1024;

#[derive(Default)]
pub struct Compression;

#[async_trait]
impl Middleware for Compression {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        let accepts_gzip = req
            .header(header::ACCEPT_ENCODING.as_str())
            .is_some_and(accepts_gzip);
        let result = next.run(req, res).await;
        if accepts_gzip {
            compress(res);
        }
        result
    }
}

fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|part| {
        let mut pieces = part.trim().split(';');
        let coding = pieces.next().unwrap_or("").trim();
        let rejected = pieces.any(|p| p.trim().replace(' ', "") == "q=0");
        (coding.eq_ignore_ascii_case("gzip") || coding == "*") && !rejected
    })
}

fn compressible(content_type: Option<&HeaderValue>) -> bool {
    let Some(ct) = content_type.and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let ct = ct.to_ascii_lowercase();
    ct.starts_with("text/")
        || ct.contains("json")
        || ct.contains("javascript")
        || ct.contains("xml")
}

fn compress(res: &mut Response) {
    res.headers_mut()
        .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));

    if res.body().len() < COMPRESSION_THRESHOLD
        || res.headers().contains_key(header::CONTENT_ENCODING)
        || !compressible(res.headers().get(header::CONTENT_TYPE))
    {
        return;
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(res.body().len() / 2), Level::default());
    let gzipped = encoder.write_all(res.body()).and_then(|()| encoder.finish());
    match gzipped {
        Ok(bytes) => {
            let native = res.native_mut();
            native.replace_body(Bytes::from(bytes));
            native
                .headers_mut()
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            native.headers_mut().remove(header::CONTENT_LENGTH);
        }
        Err(e) => tracing::warn!("gzip failed, sending identity body: {e}"),
    }
}
