//! HTTP listener and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. stops calling `listener.accept()`,
//! 2. lets every in-flight connection task run to completion,
//! 3. returns from [`Server::serve`].
//!
//! Under Kubernetes, set `terminationGracePeriodSeconds` longer than the
//! slowest request.

use std::convert::Infallible;
use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Error;
use crate::pipeline::Pipeline;

/// Accepts connections and feeds every request through a [`Pipeline`].
pub struct Server {
    addr: SocketAddr,
}

impl Server {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Parses `host:port`.
    ///
    /// ```rust
    /// use restlayer::Server;
    /// let server = Server::bind("127.0.0.1:3000").unwrap();
    /// assert_eq!(server.addr().port(), 3000);
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))?;
        Ok(Self::new(addr))
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Serves until a shutdown signal arrives and every in-flight request
    /// has completed.
    pub async fn serve(self, pipeline: Pipeline) -> Result<(), Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "restlayer listening");

        let mut tasks = tokio::task::JoinSet::new();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Shutdown is checked first so queued connections are not
                // accepted once a signal has arrived.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let pipeline = pipeline.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        let svc = service_fn(move |req| {
                            let pipeline = pipeline.clone();
                            async move { dispatch(pipeline, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections so the set stays bounded.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("restlayer stopped");
        Ok(())
    }
}

/// Every failure is answered inside the pipeline, so hyper never sees one.
async fn dispatch(
    pipeline: Pipeline,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    Ok(pipeline.handle(req, Some(remote_addr)).await)
}

/// Resolves on SIGTERM (Unix) or Ctrl-C. A handler that cannot be installed
/// is logged and that signal is then ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}
