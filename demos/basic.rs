//! In-memory invoice model served over REST.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:3000/api/billing/invoices \
//!        -H 'content-type: application/json' -d '{"customer":"acme","total":120}'
//!   curl http://localhost:3000/api/billing/invoices/1
//!   curl -X POST http://localhost:3000/api/billing/invoices/search \
//!        -H 'content-type: application/json' -d '{"customer":"acme"}'
//!   curl http://localhost:3000/healthz

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use restlayer::middleware::from_fn;
use restlayer::model::{CrudError, ModelCruds, ModelInfo, SearchResult};
use restlayer::{App, Error, Method, ServerOptions};
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};

const CONFIG: &str = r#"{
    "restlayer": {
        "port": 3000,
        "urlPrefix": "/api",
        "jsonBodySizeLimitInMb": 1,
        "logging": { "requestLogLevel": "debug" }
    }
}"#;

#[derive(Clone, Debug, Serialize)]
struct Invoice {
    id: u64,
    customer: String,
    total: u64,
}

#[derive(Deserialize)]
struct NewInvoice {
    customer: String,
    total: u64,
}

#[derive(Deserialize)]
struct InvoiceQuery {
    customer: Option<String>,
}

#[derive(Default)]
struct Invoices {
    rows: Mutex<BTreeMap<u64, Invoice>>,
}

impl Invoices {
    fn parse_id(id: &str) -> Result<u64, CrudError> {
        Ok(id.parse()?)
    }
}

#[async_trait]
impl ModelCruds for Invoices {
    type Record = Invoice;
    type Data = NewInvoice;
    type Query = InvoiceQuery;

    fn model(&self) -> ModelInfo {
        ModelInfo::new("Invoice", "billing", "Invoices")
    }

    async fn create(&self, data: NewInvoice) -> Result<Invoice, CrudError> {
        let mut rows = self.rows.lock().map_err(|e| e.to_string())?;
        let id = rows.keys().next_back().map_or(1, |last| last + 1);
        let invoice = Invoice { id, customer: data.customer, total: data.total };
        rows.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn retrieve(&self, id: &str) -> Result<Option<Invoice>, CrudError> {
        let id = Self::parse_id(id)?;
        Ok(self.rows.lock().map_err(|e| e.to_string())?.get(&id).cloned())
    }

    async fn update(&self, id: &str, data: NewInvoice) -> Result<Invoice, CrudError> {
        let id = Self::parse_id(id)?;
        let invoice = Invoice { id, customer: data.customer, total: data.total };
        self.rows.lock().map_err(|e| e.to_string())?.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn delete(&self, id: &str) -> Result<(), CrudError> {
        let id = Self::parse_id(id)?;
        self.rows.lock().map_err(|e| e.to_string())?.remove(&id);
        Ok(())
    }

    async fn search(&self, query: InvoiceQuery) -> Result<SearchResult<Invoice>, CrudError> {
        let rows = self.rows.lock().map_err(|e| e.to_string())?;
        let instances = rows
            .values()
            .filter(|inv| query.customer.as_ref().is_none_or(|c| *c == inv.customer))
            .cloned()
            .collect();
        Ok(SearchResult { instances, page: None })
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let config: serde_json::Value = serde_json::from_str(CONFIG)?;
    let mut options = ServerOptions::from_section(&config, "restlayer")?;
    options.logging = options.logging.request_data(|req| {
        let mut extra = Map::new();
        if let Some(agent) = req.header("user-agent") {
            extra.insert("userAgent".into(), json!(agent));
        }
        extra
    });

    let mut app = App::new(options)?;
    app.add_pre_route_middleware(
        "api-version",
        from_fn(|req, res, next| {
            Box::pin(async move {
                res.header(
                    http::header::HeaderName::from_static("x-api-version"),
                    http::HeaderValue::from_static("1"),
                );
                next.run(req, res).await
            })
        }),
    )
    .add_route(Method::Get, "/healthz", |_req, res| {
        Box::pin(async move { res.json(&json!({ "status": "ok" })) })
    })
    .add_model(Arc::new(Invoices::default()));

    app.listen().await
}
