use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use restlayer::middleware::{Middleware, from_fn};
use restlayer::model::{CrudError, ModelCruds, ModelInfo, SearchResult};
use restlayer::{App, Error, Method, Pipeline, Router, ServerOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing_test::traced_test;

type Trace = Arc<Mutex<Vec<String>>>;

/// Records its label plus what the framework had set up when it ran.
fn probe(label: &'static str, trace: Trace) -> impl Middleware {
    from_fn(move |req, res, next| {
        let trace = Arc::clone(&trace);
        Box::pin(async move {
            let context = if req.context().is_some() { "ctx" } else { "no-ctx" };
            let recorder = if res.recorded().is_some() { "rec" } else { "no-rec" };
            trace.lock().unwrap().push(format!("{label}:{context}:{recorder}"));
            next.run(req, res).await
        })
    })
}

async fn send(pipeline: &Pipeline, method: &str, path: &str, body: Option<Value>) -> (StatusCode, http::HeaderMap, Bytes) {
    let mut builder = http::Request::builder().method(method).uri(path);
    let bytes = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Bytes::from(body.to_string())
        }
        None => Bytes::new(),
    };
    let res = pipeline.handle(builder.body(Full::new(bytes)).unwrap(), None).await;
    let (parts, body) = res.into_parts();
    (parts.status, parts.headers, body.collect().await.unwrap().to_bytes())
}

#[tokio::test]
async fn pre_route_middleware_runs_before_framework_stages_and_routes() {
    let trace: Trace = Arc::default();
    let mut app = App::new(ServerOptions::with_port(3000)).unwrap();
    app.add_pre_route_middleware("A", probe("A", Arc::clone(&trace)))
        .add_pre_route_middleware("B", probe("B", Arc::clone(&trace)));
    let route_trace = Arc::clone(&trace);
    app.add_route(Method::Get, "/ping", move |req, res| {
        let trace = Arc::clone(&route_trace);
        Box::pin(async move {
            let scoped = req.log().and_then(|scope| scope.call_id()).is_some();
            let recorded = res.recorded().is_some();
            trace.lock().unwrap().push(format!("route:{scoped}:{recorded}"));
            res.json(&json!({ "pong": true }))
        })
    });
    let pipeline = app.build().unwrap();

    let names = pipeline.stage_names();
    let position = |name: &str| names.iter().position(|n| *n == name).unwrap();
    assert!(position("A") < position("B"));
    assert!(position("B") < position("request-id"));
    assert!(position("request-id") < position("request-logger"));
    assert!(position("request-logger") < position("response-instrumentation"));
    assert!(position("response-instrumentation") < position("response-logger"));
    assert!(position("response-logger") < position("GET /ping"));

    let (status, headers, _) = send(&pipeline, "GET", "/ping", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(
        *trace.lock().unwrap(),
        vec!["A:no-ctx:no-rec", "B:no-ctx:no-rec", "route:true:true"]
    );
}

#[tokio::test]
async fn routes_dispatch_in_registration_order() {
    let mut app = App::new(ServerOptions::with_port(3000)).unwrap();
    app.add_router(
        "early",
        Router::new().on(Method::Get, "/things/{id}", |req, res| {
            Box::pin(async move {
                let id = req.param("id").unwrap_or_default().to_owned();
                res.json(&json!({ "from": "router", "id": id }))
            })
        }),
    );
    app.add_route(Method::Get, "/things/special", |_req, res| {
        Box::pin(async move { res.json(&json!({ "from": "route" })) })
    });
    let pipeline = app.build().unwrap();

    let (_, _, body) = send(&pipeline, "GET", "/things/special", None).await;
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["from"], "router");
}

#[tokio::test]
async fn post_route_middleware_sees_unmatched_requests() {
    let mut app = App::new(ServerOptions::with_port(3000)).unwrap();
    app.add_route(Method::Get, "/known", |_req, res| {
        Box::pin(async move { res.json(&json!("known")) })
    });
    app.add_post_route_middleware(
        "fallback",
        from_fn(|req, res, _next| {
            Box::pin(async move {
                let path = req.path().to_owned();
                res.status(StatusCode::NOT_FOUND).json(&json!({ "missing": path }))
            })
        }),
    );
    let pipeline = app.build().unwrap();

    let (status, _, body) = send(&pipeline, "GET", "/known", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_ref(), br#""known""#);

    let (status, _, body) = send(&pipeline, "GET", "/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "missing": "/unknown" }));
}

#[tokio::test]
async fn unanswered_request_gets_empty_404() {
    let pipeline = App::new(ServerOptions::with_port(3000)).unwrap().build().unwrap();
    let (status, _, body) = send(&pipeline, "GET", "/nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}

#[tokio::test]
#[traced_test]
async fn handler_errors_reach_the_error_handler_without_leaking() {
    let mut app = App::new(ServerOptions::with_port(3000)).unwrap();
    app.add_route(Method::Post, "/explode", |_req, _res| {
        Box::pin(async move { Err(Error::handler("password=hunter2")) })
    });
    let pipeline = app.build().unwrap();

    let (status, _, body) = send(&pipeline, "POST", "/explode", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "error": { "code": "OverallException", "message": "Internal error" } })
    );
    assert!(!std::str::from_utf8(&body).unwrap().contains("hunter2"));
    assert!(logs_contain("error executing route"));
    assert!(logs_contain("hunter2"));
    assert!(logs_contain("request completed"));
}

#[tokio::test]
#[traced_test]
async fn request_and_completion_are_logged_with_the_same_id() {
    let mut app = App::new(ServerOptions::with_port(3000)).unwrap();
    app.add_route(Method::Post, "/echo", |req, res| {
        Box::pin(async move {
            let body = req.body_value().clone();
            res.status(StatusCode::CREATED).json(&body)
        })
    });
    let pipeline = app.build().unwrap();

    let (status, headers, _) = send(&pipeline, "POST", "/echo", Some(json!({ "marker": "m-42" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = headers["x-request-id"].to_str().unwrap().to_owned();
    assert!(logs_contain("request received"));
    assert!(logs_contain("request completed"));
    assert!(logs_contain("m-42"));
    assert!(logs_contain(&id));
}

#[tokio::test]
async fn cors_preflight_short_circuits() {
    let pipeline = App::new(ServerOptions::with_port(3000)).unwrap().build().unwrap();
    let req = http::Request::builder()
        .method("OPTIONS")
        .uri("/anything")
        .header("origin", "https://app.example")
        .header("access-control-request-method", "POST")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = pipeline.handle(req, None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn oversized_json_body_is_rejected() {
    let opts = ServerOptions::from_value(json!({ "port": 3000, "jsonBodySizeLimitInMb": 1 })).unwrap();
    let mut app = App::new(opts).unwrap();
    app.add_route(Method::Post, "/upload", |_req, res| {
        Box::pin(async move { res.json(&json!("stored")) })
    });
    let pipeline = app.build().unwrap();

    let big = json!({ "blob": "x".repeat(1024 * 1024 + 1) });
    let (status, _, body) = send(&pipeline, "POST", "/upload", Some(big)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["error"]["code"], "PayloadTooLarge");
}

// ── Model routes ─────────────────────────────────────────────────────────────

#[derive(Clone, Deserialize, Serialize)]
struct Invoice {
    #[serde(default)]
    id: String,
    total: u64,
}

#[derive(Deserialize)]
struct InvoiceQuery {
    #[serde(default)]
    explode: bool,
}

#[derive(Default)]
struct InvoiceStore {
    rows: Mutex<HashMap<String, Invoice>>,
}

#[async_trait]
impl ModelCruds for InvoiceStore {
    type Record = Invoice;
    type Data = Invoice;
    type Query = InvoiceQuery;

    fn model(&self) -> ModelInfo {
        ModelInfo::new("Invoice", "Billing", "Invoices")
    }

    async fn create(&self, mut data: Invoice) -> Result<Invoice, CrudError> {
        let mut rows = self.rows.lock().unwrap();
        data.id = format!("inv-{}", rows.len() + 1);
        rows.insert(data.id.clone(), data.clone());
        Ok(data)
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Invoice>, CrudError> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn update(&self, id: &str, mut data: Invoice) -> Result<Invoice, CrudError> {
        data.id = id.to_owned();
        self.rows.lock().unwrap().insert(id.to_owned(), data.clone());
        Ok(data)
    }

    async fn delete(&self, id: &str) -> Result<(), CrudError> {
        self.rows.lock().unwrap().remove(id);
        Ok(())
    }

    async fn search(&self, query: InvoiceQuery) -> Result<SearchResult<Invoice>, CrudError> {
        if query.explode {
            return Err("upstream ledger timeout at 10.1.2.3".into());
        }
        let instances = self.rows.lock().unwrap().values().cloned().collect();
        Ok(SearchResult { instances, page: None })
    }
}

fn model_app(prefix: &str) -> Pipeline {
    let opts = ServerOptions::from_value(json!({ "port": 3000, "urlPrefix": prefix })).unwrap();
    let mut app = App::new(opts).unwrap();
    app.add_model(Arc::new(InvoiceStore::default()));
    app.build().unwrap()
}

#[tokio::test]
async fn model_routes_live_under_namespace_and_plural() {
    let pipeline = model_app("/");
    assert!(pipeline.stage_names().contains(&"model /billing/invoices"));

    let (status, _, body) = send(&pipeline, "POST", "/billing/invoices", Some(json!({ "total": 5 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "id": "inv-1", "total": 5 }));

    let (status, _, body) = send(&pipeline, "GET", "/billing/invoices/inv-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["total"], 5);

    let prefixed = model_app("/api");
    let (status, _, _) = send(&prefixed, "POST", "/api/billing/invoices", Some(json!({ "total": 1 }))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_model_record_is_plain_404() {
    let pipeline = model_app("/");
    let (status, _, body) = send(&pipeline, "GET", "/billing/invoices/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}

#[tokio::test]
#[traced_test]
async fn model_search_failure_returns_generic_envelope() {
    let pipeline = model_app("/");
    let (status, _, body) =
        send(&pipeline, "POST", "/billing/invoices/search", Some(json!({ "explode": true }))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let text = std::str::from_utf8(&body).unwrap();
    assert!(!text.contains("upstream ledger timeout"));
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({ "error": { "code": "InternalServerError", "message": "An unexpected error occurred" } })
    );
    assert!(logs_contain("upstream ledger timeout at 10.1.2.3"));
    assert!(logs_contain("Invoice"));
}
