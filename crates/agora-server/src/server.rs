//! HTTP server.
//!
//! Accepts HTTP/1.1 connections with hyper, collects each request body and
//! hands the request to [`Gateway::handle`] with the peer address as the
//! client IP. Operational endpoints under `/_gateway/` are answered first.
//!
//! Body collection is bounded by the body timeout. A body that times out or
//! fails to read is replaced by an empty one marked [`UnreadableBody`], so
//! the pipeline still rejects it with gateway headers and a request metric.
//!
//! On shutdown the listener stops accepting, open connections finish their
//! in-flight request, and the server waits up to the configured shutdown
//! timeout for them to close.
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_server::{GatewayServer, ShutdownSignal};
//! use std::sync::Arc;
//!
//! let server = GatewayServer::new(Arc::new(gateway));
//! server.run_with_shutdown(ShutdownSignal::with_os_signals()?).await?;
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agora::middleware::stages::UnreadableBody;
use agora::{Gateway, GatewayError};
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::error::{ServerError, ServerResult};
use crate::ops;
use crate::shutdown::ShutdownSignal;

/// Type alias for the HTTP response body.
pub type ResponseBody = Full<Bytes>;

/// Type alias for the HTTP response.
pub type HttpResponse = Response<ResponseBody>;

/// HTTP front end for a [`Gateway`].
#[derive(Debug, Clone)]
pub struct GatewayServer {
    gateway: Arc<Gateway>,
    http_addr: String,
    shutdown_timeout: Duration,
    body_timeout: Duration,
}

impl GatewayServer {
    /// Creates a server using the gateway's `server` configuration.
    #[must_use]
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let server = &gateway.config().server;
        let http_addr = server.http_addr.clone();
        let shutdown_timeout = server.shutdown_timeout();
        let body_timeout = server.body_timeout();
        Self {
            gateway,
            http_addr,
            shutdown_timeout,
            body_timeout,
        }
    }

    /// Overrides the listen address.
    #[must_use]
    pub fn with_http_addr(mut self, addr: impl Into<String>) -> Self {
        self.http_addr = addr.into();
        self
    }

    /// Overrides how long shutdown waits for open connections.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Overrides how long a request body may take to arrive.
    #[must_use]
    pub fn with_body_timeout(mut self, timeout: Duration) -> Self {
        self.body_timeout = timeout;
        self
    }

    /// Returns the configured listen address.
    #[must_use]
    pub fn http_addr(&self) -> &str {
        &self.http_addr
    }

    /// Returns the gateway behind this server.
    #[must_use]
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the address does not parse or cannot be bound.
    pub async fn bind(&self) -> ServerResult<TcpListener> {
        let addr: SocketAddr =
            self.http_addr
                .parse()
                .map_err(|source| ServerError::InvalidAddress {
                    addr: self.http_addr.clone(),
                    source,
                })?;
        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })
    }

    /// Binds and serves until `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the listener cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serves connections from `listener` until `shutdown` is triggered.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "gateway listening");
        }

        let server = Arc::new(self);
        let connections = TaskTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            let result =
                                server.handle_connection(stream, remote_addr, shutdown).await;
                            if let Err(err) = result {
                                debug!(
                                    remote = %remote_addr,
                                    error = %err,
                                    "connection closed with error"
                                );
                            }
                        });
                    }
                    Err(err) => error!(error = %err, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        connections.close();
        info!(
            open_connections = connections.len(),
            timeout_secs = server.shutdown_timeout.as_secs(),
            "waiting for open connections"
        );
        if tokio::time::timeout(server.shutdown_timeout, connections.wait())
            .await
            .is_err()
        {
            warn!(
                open_connections = connections.len(),
                "shutdown timeout reached with connections still open"
            );
        }
        info!("server stopped");
    }

    async fn handle_connection(
        self: &Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle_request(req, remote_addr).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                debug!(remote = %remote_addr, "draining connection for shutdown");
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    async fn handle_request(
        &self,
        req: Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> HttpResponse {
        let (parts, body) = req.into_parts();
        let request = match tokio::time::timeout(self.body_timeout, body.collect()).await {
            Ok(Ok(collected)) => Request::from_parts(parts, collected.to_bytes()),
            Ok(Err(err)) => {
                warn!(remote = %remote_addr, error = %err, "failed to read request body");
                unreadable(parts, GatewayError::validation("body: unreadable"))
            }
            Err(_) => {
                warn!(
                    remote = %remote_addr,
                    timeout_ms = self.body_timeout.as_millis() as u64,
                    "request body collection timed out"
                );
                unreadable(
                    parts,
                    GatewayError::Timeout {
                        timeout: self.body_timeout,
                    },
                )
            }
        };
        self.dispatch(request, remote_addr).await.map(Full::new)
    }

    /// Answers one fully-read request.
    pub async fn dispatch(
        &self,
        request: agora::Request,
        remote_addr: SocketAddr,
    ) -> agora::Response {
        let ops = ops::respond(&self.gateway, request.method(), request.uri().path());
        if let Some(response) = ops {
            return response;
        }
        self.gateway.handle(request, Some(remote_addr.ip())).await
    }
}

fn unreadable(parts: http::request::Parts, err: GatewayError) -> agora::Request {
    let mut request = Request::from_parts(parts, Bytes::new());
    request.extensions_mut().insert(UnreadableBody(err));
    request
}
