//! Routing stage.
//!
//! Exact `(path, method)` lookup in the [`EndpointRegistry`]. A miss ends the
//! pipeline with `404`; a hit stores the [`Route`](agora_core::Route) in the
//! context for every later stage and for dispatch.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use agora_core::{EndpointRegistry, GatewayError};
use std::sync::Arc;

/// Middleware that resolves the endpoint for the request.
#[derive(Debug, Clone)]
pub struct RoutingMiddleware {
    registry: Arc<EndpointRegistry>,
}

impl RoutingMiddleware {
    /// Creates the stage over a frozen registry.
    #[must_use]
    pub fn new(registry: Arc<EndpointRegistry>) -> Self {
        Self { registry }
    }
}

impl Middleware for RoutingMiddleware {
    fn name(&self) -> &'static str {
        "routing"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let path = request.uri().path();
            match self.registry.lookup(path, request.method()) {
                Some(route) => {
                    ctx.set_route(route);
                    next.run(ctx, request).await
                }
                None => {
                    tracing::debug!(method = %request.method(), path, "no endpoint registered");
                    ctx.reject(GatewayError::not_found(request.method().as_str(), path))
                }
            }
        })
    }
}
