//! Generated handlers for a model collaborator.

use std::fmt;
use std::sync::Arc;

use http::StatusCode;
use serde_json::{Map, json};

use super::naming::{RouteNaming, base_path};
use super::{CrudError, ModelCruds};
use crate::error::{Error, ErrorEnvelope};
use crate::handler::{BoxedHandler, boxed};
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::router::Router;

/// A generated model endpoint.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Create,
    Retrieve,
    Update,
    Delete,
    Search,
    BulkInsert,
    BulkDelete,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Retrieve => "retrieve",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Search => "search",
            Self::BulkInsert => "bulkInsert",
            Self::BulkDelete => "bulkDelete",
        }
    }

    async fn run<M: ModelCruds>(self, model: &M, req: &mut Request, res: &mut Response) -> Result<(), CrudError> {
        match self {
            Self::Create => {
                let data: M::Data = req.json()?;
                let record = model.create(data).await?;
                res.json(&record)?;
            }
            Self::Retrieve => {
                let id = path_id(req)?;
                match model.retrieve(&id).await? {
                    Some(record) => res.json(&record)?,
                    None => res.status(StatusCode::NOT_FOUND).end(),
                }
            }
            Self::Update => {
                let id = path_id(req)?;
                let data: M::Data = req.json()?;
                let record = model.update(&id, data).await?;
                res.json(&record)?;
            }
            Self::Delete => {
                let id = path_id(req)?;
                model.delete(&id).await?;
                res.end();
            }
            Self::Search => {
                let query: M::Query = req.json()?;
                let page = model.search(query).await?;
                res.json(&page)?;
            }
            Self::BulkInsert => {
                let data: Vec<M::Data> = req.json()?;
                model.bulk_insert(data).await?;
                res.end();
            }
            Self::BulkDelete => {
                let query: M::Query = req.json()?;
                model.bulk_delete(query).await?;
                res.end();
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn path_id(req: &Request) -> Result<String, CrudError> {
    req.param("id")
        .map(str::to_owned)
        .ok_or_else(|| "missing `id` path parameter".into())
}

/// Wraps one operation in the catch-all: collaborator failures are logged
/// with the model and operation names and answered `500` with a generic
/// envelope.
fn handler<M: ModelCruds>(model: Arc<M>, operation: Operation) -> BoxedHandler {
    boxed(move |req, res| {
        let model = Arc::clone(&model);
        Box::pin(async move {
            let Err(err) = operation.run(&*model, req, res).await else {
                return Ok(());
            };
            let name = model.model().name;
            let mut fields = Map::new();
            fields.insert("model".into(), json!(name));
            fields.insert("operation".into(), json!(operation.as_str()));
            match req.log() {
                Some(scope) => scope.error("model operation failed", &*err, fields),
                None => tracing::error!(model = %name, %operation, "model operation failed: {err}"),
            }
            res.status(StatusCode::INTERNAL_SERVER_ERROR)
                .json(&ErrorEnvelope::internal_server_error())
        })
    })
}

/// Builds the router for `model` under `prefix`.
///
/// Fails only if the derived paths are not valid route patterns.
pub fn model_router<M: ModelCruds>(model: Arc<M>, prefix: &str, naming: RouteNaming) -> Result<Router, Error> {
    let info = model.model();
    if naming == RouteNaming::FlatName {
        tracing::warn!(
            model = %info.name,
            namespace = %info.namespace,
            "flat model route naming is deprecated and collides across namespaces"
        );
    }
    let base = base_path(prefix, &info, naming);
    let item = format!("{base}/{{id}}");

    let mut router = Router::new()
        .try_on(Method::Post, &base, handler(Arc::clone(&model), Operation::Create))?
        .try_on(Method::Get, &item, handler(Arc::clone(&model), Operation::Retrieve))?
        .try_on(Method::Put, &item, handler(Arc::clone(&model), Operation::Update))?
        .try_on(Method::Delete, &item, handler(Arc::clone(&model), Operation::Delete))?
        .try_on(Method::Post, &format!("{base}/search"), handler(Arc::clone(&model), Operation::Search))?;

    if model.supports_bulk() {
        let bulk = format!("{base}/bulk");
        router = router
            .try_on(Method::Post, &bulk, handler(Arc::clone(&model), Operation::BulkInsert))?
            .try_on(Method::Delete, &bulk, handler(Arc::clone(&model), Operation::BulkDelete))?;
    }
    tracing::debug!(model = %info.name, base = %base, "derived model routes");
    Ok(router)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use tracing_test::traced_test;

    use super::*;
    use crate::middleware::body::BodyParser;
    use crate::middleware::framework::RequestId;
    use crate::middleware::Stage;
    use crate::model::{ModelInfo, SearchResult};
    use crate::pipeline::Pipeline;

    #[derive(Clone, Debug, Deserialize, Serialize)]
    struct Invoice {
        #[serde(default)]
        id: String,
        amount: u64,
    }

    #[derive(Deserialize)]
    struct Query {
        #[serde(default)]
        fail: bool,
    }

    #[derive(Default)]
    struct Invoices {
        rows: Mutex<HashMap<String, Invoice>>,
        bulk: bool,
    }

    #[async_trait]
    impl ModelCruds for Invoices {
        type Record = Invoice;
        type Data = Invoice;
        type Query = Query;

        fn model(&self) -> ModelInfo {
            ModelInfo::new("Invoice", "billing", "Invoices")
        }

        async fn create(&self, mut data: Invoice) -> Result<Invoice, CrudError> {
            let mut rows = self.rows.lock().unwrap();
            data.id = (rows.len() + 1).to_string();
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

        async fn search(&self, query: Query) -> Result<SearchResult<Invoice>, CrudError> {
            if query.fail {
                return Err("ledger shard 7 unreachable".into());
            }
            let mut instances: Vec<Invoice> = self.rows.lock().unwrap().values().cloned().collect();
            instances.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(SearchResult { instances, page: None })
        }

        fn supports_bulk(&self) -> bool {
            self.bulk
        }

        async fn bulk_insert(&self, data: Vec<Invoice>) -> Result<(), CrudError> {
            for row in data {
                self.create(row).await?;
            }
            Ok(())
        }
    }

    fn pipeline(model: Invoices) -> Pipeline {
        let router = model_router(Arc::new(model), "/", RouteNaming::NamespacedPlural).unwrap();
        Pipeline::new(vec![
            Stage::new("json", Arc::new(BodyParser::json(1024 * 1024))),
            Stage::new("request-id", Arc::new(RequestId)),
            Stage::new("invoices", Arc::new(router)),
        ])
    }

    async fn call(pipeline: &Pipeline, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Bytes) {
        let mut builder = http::Request::builder().method(method).uri(path);
        let bytes = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Bytes::from(body.to_string())
            }
            None => Bytes::new(),
        };
        let res = pipeline.handle(builder.body(Full::new(bytes)).unwrap(), None).await;
        let status = res.status();
        (status, res.into_body().collect().await.unwrap().to_bytes())
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let pipeline = pipeline(Invoices::default());

        let (status, body) = call(&pipeline, "POST", "/billing/invoices", Some(json!({ "amount": 10 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "id": "1", "amount": 10 }));

        let (status, body) = call(&pipeline, "GET", "/billing/invoices/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "id": "1", "amount": 10 }));

        let (status, _) = call(&pipeline, "PUT", "/billing/invoices/1", Some(json!({ "amount": 25 }))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(&pipeline, "POST", "/billing/invoices/search", Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            json!({ "instances": [{ "id": "1", "amount": 25 }], "page": null })
        );

        let (status, body) = call(&pipeline, "DELETE", "/billing/invoices/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn missing_record_is_404_with_empty_body() {
        let pipeline = pipeline(Invoices::default());
        let (status, body) = call(&pipeline, "GET", "/billing/invoices/404", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
        assert!(!logs_contain("model operation failed"));
    }

    #[tokio::test]
    #[traced_test]
    async fn collaborator_failure_is_hidden_from_the_client() {
        let pipeline = pipeline(Invoices::default());
        let (status, body) =
            call(&pipeline, "POST", "/billing/invoices/search", Some(json!({ "fail": true }))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = std::str::from_utf8(&body).unwrap();
        assert!(!text.contains("ledger shard 7 unreachable"));
        assert_eq!(
            serde_json::from_slice::<Value>(&body).unwrap(),
            json!({ "error": { "code": "InternalServerError", "message": "An unexpected error occurred" } })
        );
        assert!(logs_contain("model operation failed"));
        assert!(logs_contain("ledger shard 7 unreachable"));
        assert!(logs_contain("search"));
    }

    #[tokio::test]
    async fn bulk_routes_follow_the_capability() {
        let without = pipeline(Invoices::default());
        let (status, _) = call(&without, "POST", "/billing/invoices/bulk", Some(json!([]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let with = pipeline(Invoices { bulk: true, ..Invoices::default() });
        let (status, body) =
            call(&with, "POST", "/billing/invoices/bulk", Some(json!([{ "amount": 1 }, { "amount": 2 }]))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        let (_, body) = call(&with, "GET", "/billing/invoices/2", None).await;
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "id": "2", "amount": 2 }));

        let (status, _) = call(&with, "DELETE", "/billing/invoices/bulk", Some(json!({}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
