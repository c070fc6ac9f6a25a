//! Model-derived REST routes.
//!
//! A model collaborator implements [`ModelCruds`]; [`model_router`] turns it
//! into a [`Router`](crate::Router) exposing the standard endpoints under a
//! base path derived from the model's namespace and plural name:
//!
//! | Method | Path             | Operation     |
//! |--------|------------------|---------------|
//! | POST   | `{base}`         | create        |
//! | GET    | `{base}/{id}`    | retrieve      |
//! | PUT    | `{base}/{id}`    | update        |
//! | DELETE | `{base}/{id}`    | delete        |
//! | POST   | `{base}/search`  | search        |
//! | POST   | `{base}/bulk`    | bulk insert   |
//! | DELETE | `{base}/bulk`    | bulk delete   |
//!
//! The two bulk routes exist only when [`ModelCruds::supports_bulk`] is true.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BoxError;

mod controller;
mod naming;

pub use controller::{Operation, model_router};
pub use naming::{RouteNaming, base_path, kebab_case, normalize_prefix};

/// Errors raised by a model collaborator. Never sent to the client.
pub type CrudError = BoxError;

/// Descriptive metadata of a model.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Singular model name. Only used by [`RouteNaming::FlatName`].
    pub name: String,
    pub namespace: String,
    pub plural_name: String,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, plural_name: impl Into<String>) -> Self {
        Self { name: name.into(), namespace: namespace.into(), plural_name: plural_name.into() }
    }
}

/// One page of search results: `{"instances": [...], "page": ...}`.
#[derive(Clone, Debug, Serialize)]
pub struct SearchResult<R> {
    pub instances: Vec<R>,
    /// Opaque continuation token, `null` on the last page.
    pub page: Option<Value>,
}

/// The data-access contract a model exposes to the HTTP layer.
///
/// Records are returned to clients through their `Serialize` impl. Input
/// payloads and queries are deserialized from the parsed request body.
#[async_trait]
pub trait ModelCruds: Send + Sync + 'static {
    type Record: Serialize + Send;
    type Data: DeserializeOwned + Send;
    type Query: DeserializeOwned + Send;

    fn model(&self) -> ModelInfo;

    async fn create(&self, data: Self::Data) -> Result<Self::Record, CrudError>;

    /// `Ok(None)` when no record has this id.
    async fn retrieve(&self, id: &str) -> Result<Option<Self::Record>, CrudError>;

    async fn update(&self, id: &str, data: Self::Data) -> Result<Self::Record, CrudError>;

    async fn delete(&self, id: &str) -> Result<(), CrudError>;

    async fn search(&self, query: Self::Query) -> Result<SearchResult<Self::Record>, CrudError>;

    fn supports_bulk(&self) -> bool {
        false
    }

    async fn bulk_insert(&self, _data: Vec<Self::Data>) -> Result<(), CrudError> {
        Err("bulk insert is not supported by this model".into())
    }

    async fn bulk_delete(&self, _query: Self::Query) -> Result<(), CrudError> {
        Err("bulk delete is not supported by this model".into())
    }
}
