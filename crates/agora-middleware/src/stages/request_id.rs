//! Request ID stage.
//!
//! Every request gets a UUID v7 [`RequestId`]. An inbound `X-Request-ID` is
//! reused only when the stage is built with
//! [`RequestIdMiddleware::trust_incoming`] and the value parses as a UUID;
//! otherwise the id is always fresh. The id is echoed back by the telemetry
//! stage as `X-Gateway-Request-ID`.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{headers, Request, Response};
use agora_core::RequestId;

/// Middleware that assigns the request ID.
#[derive(Debug, Clone, Default)]
pub struct RequestIdMiddleware {
    /// Whether to reuse an upstream `X-Request-ID`.
    trust_incoming: bool,
}

impl RequestIdMiddleware {
    /// Creates a stage that always generates a fresh ID.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a stage that reuses a valid inbound `X-Request-ID`.
    #[must_use]
    pub fn trust_incoming() -> Self {
        Self { trust_incoming: true }
    }

    fn extract_request_id(&self, request: &Request) -> Option<RequestId> {
        if !self.trust_incoming {
            return None;
        }

        request
            .headers()
            .get(headers::REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .and_then(RequestId::parse)
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &'static str {
        "request_id"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if let Some(request_id) = self.extract_request_id(&request) {
                ctx.set_request_id(request_id);
            }
            next.run(ctx, request).await
        })
    }
}
