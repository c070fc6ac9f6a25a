//! # restlayer
//!
//! An HTTP layer that turns model CRUD operations into a running REST server.
//!
//! - Ordered assembly: caller and framework middleware, routes and routers
//!   are composed into one [`Pipeline`] in a fixed, auditable order
//!   ([`Pipeline::stage_names`]).
//! - Response instrumentation: a recorder decorates the response writer and
//!   captures the final status, payload and redirect target.
//! - Correlation logging: every request gets a UUID and a [`LogScope`];
//!   every route invocation gets a nested scope with its own call id.
//! - Model routes: any [`ModelCruds`](model::ModelCruds) implementation is
//!   mounted as `POST {base}`, `GET|PUT|DELETE {base}/{id}`,
//!   `POST {base}/search` and, optionally, `POST|DELETE {base}/bulk`, where
//!   `{base}` is `{urlPrefix}{namespace}/{plural}` in kebab case.
//!
//! Built on hyper 1 (HTTP/1.1 and HTTP/2), [`matchit`] radix matching and
//! tokio, with graceful shutdown on SIGTERM / Ctrl-C.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use restlayer::{App, Method, ServerOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restlayer::Error> {
//!     let options = ServerOptions::from_json_str(r#"{ "port": 3000, "urlPrefix": "/api/" }"#)?;
//!     let mut app = App::new(options)?;
//!     app.add_route(Method::Get, "/api/users/{id}", |req, res| Box::pin(async move {
//!         let id = req.param("id").unwrap_or_default().to_owned();
//!         res.json(&serde_json::json!({ "id": id }))
//!     }));
//!     app.listen().await
//! }
//! ```

mod app;
mod error;
mod method;
mod pipeline;
mod request;
mod response;
mod router;
mod server;

pub mod config;
pub mod handler;
pub mod instrument;
pub mod logging;
pub mod middleware;
pub mod model;

pub use app::{App, SessionFactory};
pub use config::{LogLevel, LoggingOptions, ServerOptions};
pub use error::{BoxError, ConfigError, Error, ErrorDetails, ErrorEnvelope};
pub use logging::{LogScope, RequestContext};
pub use method::Method;
pub use pipeline::{CallerStages, FrameworkStages, Pipeline, build_pipeline};
pub use request::Request;
pub use response::{NativeResponse, Response, ResponseWriter};
pub use router::{Route, Router};
pub use server::Server;
