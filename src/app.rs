//! The server assembler.
//!
//! [`App`] collects registrations (routes, routers, models, middleware) and
//! composes them with the framework stages into a [`Pipeline`] in a fixed
//! order. [`App::build`] produces the pipeline without binding a socket;
//! [`App::listen`] builds and serves it.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;

use crate::config::{CONFIG_SECTION, ServerOptions};
use crate::error::{ConfigError, Error};
use crate::handler::{BoxFuture, BoxedHandler, HandlerResult, boxed};
use crate::method::Method;
use crate::middleware::body::BodyParser;
use crate::middleware::compression::Compression;
use crate::middleware::cors::Cors;
use crate::middleware::framework::{RequestId, RequestLogger, ResponseInstrumentation, ResponseLogger};
use crate::middleware::proxy::TrustProxy;
use crate::middleware::{BoxedMiddleware, Middleware, Stage};
use crate::model::{ModelCruds, RouteNaming, base_path, model_router, normalize_prefix};
use crate::pipeline::{CallerStages, FrameworkStages, Pipeline, build_pipeline};
use crate::request::Request;
use crate::response::Response;
use crate::router::{Route, Router};
use crate::server::Server;

/// Builds session middleware from the opaque `session` options.
pub type SessionFactory = Arc<dyn Fn(&Value) -> Result<BoxedMiddleware, Error> + Send + Sync>;

type ModelRoutes = Arc<dyn Fn(&str) -> Result<Router, Error> + Send + Sync>;

enum RouteEntry {
    Route { method: Method, path: String, handler: BoxedHandler },
    Router { name: String, router: BoxedMiddleware },
    Model { name: String, routes: ModelRoutes },
}

/// Registration surface and assembler.
///
/// ```rust
/// use restlayer::{App, Method, ServerOptions};
/// use restlayer::middleware::from_fn;
///
/// let mut app = App::new(ServerOptions::with_port(8080)).unwrap();
/// app.add_pre_route_middleware("tenant", from_fn(|req, res, next| Box::pin(async move {
///     next.run(req, res).await
/// })));
/// app.add_route(Method::Get, "/health", |_req, res| Box::pin(async move {
///     res.json(&serde_json::json!({ "ok": true }))
/// }));
/// let pipeline = app.build().unwrap();
/// assert!(pipeline.stage_names().contains(&"GET /health"));
/// ```
pub struct App {
    options: ServerOptions,
    port: u16,
    uses: Vec<Stage>,
    pre_route: Vec<Stage>,
    routes: Vec<RouteEntry>,
    post_route: Vec<Stage>,
    session: Option<SessionFactory>,
}

impl App {
    /// Fails if the options carry no usable port.
    pub fn new(options: ServerOptions) -> Result<Self, Error> {
        let port = options.validate()?;
        Ok(Self {
            options,
            port,
            uses: Vec::new(),
            pre_route: Vec::new(),
            routes: Vec::new(),
            post_route: Vec::new(),
            session: None,
        })
    }

    /// Reads the `restlayer` section of a larger configuration document.
    pub fn from_config(config: &Value) -> Result<Self, Error> {
        Self::new(ServerOptions::from_section(config, CONFIG_SECTION)?)
    }

    pub fn options(&self) -> &ServerOptions { &self.options }
    pub fn port(&self) -> u16 { self.port }

    /// Application-level middleware that runs before every framework stage.
    pub fn add_use(&mut self, name: impl Into<String>, middleware: impl Middleware) -> &mut Self {
        self.uses.push(Stage::new(name, Arc::new(middleware)));
        self
    }

    /// Caller middleware that runs after the body parsers and before the
    /// request-id stage.
    pub fn add_pre_route_middleware(&mut self, name: impl Into<String>, middleware: impl Middleware) -> &mut Self {
        self.pre_route.push(Stage::new(name, Arc::new(middleware)));
        self
    }

    /// Caller middleware that runs after every route.
    pub fn add_post_route_middleware(&mut self, name: impl Into<String>, middleware: impl Middleware) -> &mut Self {
        self.post_route.push(Stage::new(name, Arc::new(middleware)));
        self
    }

    /// Registers an explicit route. The pattern is validated by [`App::build`].
    pub fn add_route<F>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Request, &'a mut Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.routes.push(RouteEntry::Route { method, path: path.to_owned(), handler: boxed(handler) });
        self
    }

    /// Mounts a pre-built router as one unit.
    pub fn add_router(&mut self, name: impl Into<String>, router: Router) -> &mut Self {
        self.routes.push(RouteEntry::Router { name: name.into(), router: Arc::new(router) });
        self
    }

    /// Mounts the REST routes of `model` under the configured URL prefix.
    pub fn add_model<M: ModelCruds>(&mut self, model: Arc<M>) -> &mut Self {
        self.add_model_with_naming(model, RouteNaming::default())
    }

    pub fn add_model_with_naming<M: ModelCruds>(&mut self, model: Arc<M>, naming: RouteNaming) -> &mut Self {
        let name = format!("model {}", base_path(&self.options.url_prefix, &model.model(), naming));
        let routes: ModelRoutes = Arc::new(move |prefix: &str| model_router(Arc::clone(&model), prefix, naming));
        self.routes.push(RouteEntry::Model { name, routes });
        self
    }

    /// Supplies the session store used when `session` options are present.
    pub fn with_session_store(
        &mut self,
        factory: impl Fn(&Value) -> Result<BoxedMiddleware, Error> + Send + Sync + 'static,
    ) -> &mut Self {
        self.session = Some(Arc::new(factory));
        self
    }

    /// Assembles the pipeline without binding a socket.
    pub fn build(&self) -> Result<Pipeline, Error> {
        let framework = self.framework_stages()?;
        let mut routes = Vec::with_capacity(self.routes.len());
        for entry in &self.routes {
            routes.push(match entry {
                RouteEntry::Route { method, path, handler } => {
                    let route = Route::new(*method, path, Arc::clone(handler))?;
                    Stage::new(route.label(), Arc::new(route))
                }
                RouteEntry::Router { name, router } => Stage::new(name.clone(), Arc::clone(router)),
                RouteEntry::Model { name, routes } => {
                    Stage::new(name.clone(), Arc::new(routes(&self.options.url_prefix)?))
                }
            });
        }
        let caller = CallerStages {
            uses: self.uses.clone(),
            pre_route: self.pre_route.clone(),
            routes,
            post_route: self.post_route.clone(),
        };
        let pipeline = build_pipeline(framework, caller);
        tracing::debug!(stages = ?pipeline.stage_names(), "pipeline assembled");
        Ok(pipeline)
    }

    fn framework_stages(&self) -> Result<FrameworkStages, Error> {
        let opts = &self.options;
        let mut toggles = Vec::new();
        if opts.trust_proxy_enabled() {
            toggles.push(Stage::new("trust-proxy", Arc::new(TrustProxy)));
        }
        if opts.cors_enabled() {
            toggles.push(Stage::new("cors", Arc::new(Cors::default())));
        }
        if opts.compression_enabled() {
            toggles.push(Stage::new("compression", Arc::new(Compression)));
        }
        if let Some(session) = &opts.session {
            let factory = self.session.as_ref().ok_or(ConfigError::MissingSessionStore)?;
            toggles.push(Stage::new("session", factory(session)?));
        }

        let parsers = vec![
            Stage::new("urlencoded-parser", Arc::new(BodyParser::urlencoded(opts.encoded_limit_bytes()))),
            Stage::new("json-parser", Arc::new(BodyParser::json(opts.json_limit_bytes()))),
        ];

        let logging = &opts.logging;
        let pre_route = vec![
            Stage::new("request-id", Arc::new(RequestId)),
            Stage::new(
                "request-logger",
                Arc::new(RequestLogger::new(logging.request_log_level, logging.request_log_data_callback.clone())),
            ),
            Stage::new("response-instrumentation", Arc::new(ResponseInstrumentation)),
            Stage::new(
                "response-logger",
                Arc::new(ResponseLogger::new(logging.response_log_level, logging.response_log_data_callback.clone())),
            ),
        ];

        Ok(FrameworkStages { toggles, parsers, pre_route })
    }

    /// Builds the pipeline and serves it on `0.0.0.0:{port}` until shutdown.
    pub async fn listen(&self) -> Result<(), Error> {
        let pipeline = self.build()?;
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!(
            port = self.port,
            url_prefix = %normalize_prefix(&self.options.url_prefix),
            "starting listener"
        );
        Server::new(addr).serve(pipeline).await
    }
}
