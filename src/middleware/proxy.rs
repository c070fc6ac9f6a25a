//! Trust-proxy: take the client address and protocol from forwarding headers.

use std::net::IpAddr;

use async_trait::async_trait;

use super::{Middleware, Next};
use crate::handler::HandlerResult;
use crate::request::Request;
use crate::response::Response;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Rewrites [`Request::ip`] and [`Request::protocol`] from `X-Forwarded-For`
/// (left-most entry) and `X-Forwarded-Proto`.
pub struct TrustProxy;

#[async_trait]
impl Middleware for TrustProxy {
    async fn handle(&self, req: &mut Request, res: &mut Response, next: Next) -> HandlerResult {
        let ip = req.header(X_FORWARDED_FOR).and_then(client_ip);
        let protocol = req
            .header(X_FORWARDED_PROTO)
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty());
        req.set_forwarded(ip, protocol);
        next.run(req, res).await
    }
}

fn client_ip(forwarded_for: &str) -> Option<IpAddr> {
    forwarded_for.split(',').next()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use http_body_util::Empty;

    use super::*;
    use crate::middleware::Stage;

    #[tokio::test]
    async fn forwarded_headers_win() {
        let req = http::Request::get("/")
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.2")
            .header("x-forwarded-proto", "HTTPS")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let mut req = Request::from_http(req, Some("10.0.0.2:40000".parse().unwrap()));
        let stages = vec![Stage::new("trust-proxy", Arc::new(TrustProxy))];
        Next::new(stages.into()).run(&mut req, &mut Response::new()).await.unwrap();
        assert_eq!(req.ip(), Some("203.0.113.7".parse().unwrap()));
        assert_eq!(req.protocol(), "https");
    }

    #[tokio::test]
    async fn garbage_falls_back_to_peer() {
        let req = http::Request::get("/")
            .header("x-forwarded-for", "not-an-ip")
            .body(Empty::<Bytes>::new())
            .unwrap();
        let mut req = Request::from_http(req, Some("10.0.0.2:40000".parse().unwrap()));
        let stages = vec![Stage::new("trust-proxy", Arc::new(TrustProxy))];
        Next::new(stages.into()).run(&mut req, &mut Response::new()).await.unwrap();
        assert_eq!(req.ip(), Some("10.0.0.2".parse().unwrap()));
        assert_eq!(req.protocol(), "http");
    }
}
