//! Middleware context types.
//!
//! The [`MiddlewareContext`] carries per-request state through the pipeline.
//! Each stage enriches it (request id, trace ids, caller identity, matched
//! route) for the stages that follow.

use agora_core::{CallerIdentity, GatewayError, RequestId, Response, Route};
use chrono::{DateTime, Utc};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Context that flows through the middleware pipeline.
///
/// # Example
///
/// ```
/// use agora_middleware::context::MiddlewareContext;
/// use agora_core::CallerIdentity;
///
/// let mut ctx = MiddlewareContext::new();
/// ctx.set_identity(CallerIdentity::user("user-123", ["customer"]));
///
/// assert_eq!(ctx.identity().user_id(), Some("user-123"));
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    request_id: RequestId,
    identity: CallerIdentity,
    trace_id: Option<String>,
    span_id: Option<String>,
    client_ip: Option<IpAddr>,
    route: Option<Arc<Route>>,
    started_at: Instant,
    received_at: DateTime<Utc>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a new middleware context with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            identity: CallerIdentity::Anonymous,
            trace_id: None,
            span_id: None,
            client_ip: None,
            route: None,
            started_at: Instant::now(),
            received_at: Utc::now(),
            extensions: HashMap::new(),
        }
    }

    /// Creates a context for a request received from `client_ip`.
    #[must_use]
    pub fn for_client(client_ip: Option<IpAddr>) -> Self {
        Self {
            client_ip,
            ..Self::new()
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Sets the request ID.
    ///
    /// This should only be called by the request ID stage.
    pub fn set_request_id(&mut self, request_id: RequestId) {
        self.request_id = request_id;
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Sets the caller identity.
    ///
    /// This should only be called by the identity stage.
    pub fn set_identity(&mut self, identity: CallerIdentity) {
        self.identity = identity;
    }

    /// Returns the trace ID, if set.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// Sets the trace ID.
    pub fn set_trace_id(&mut self, trace_id: String) {
        self.trace_id = Some(trace_id);
    }

    /// Returns the span ID, if set.
    #[must_use]
    pub fn span_id(&self) -> Option<&str> {
        self.span_id.as_deref()
    }

    /// Sets the span ID.
    pub fn set_span_id(&mut self, span_id: String) {
        self.span_id = Some(span_id);
    }

    /// Returns the caller IP, if known.
    #[must_use]
    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// Returns the matched route, once routing has run.
    #[must_use]
    pub fn route(&self) -> Option<&Arc<Route>> {
        self.route.as_ref()
    }

    /// Sets the matched route.
    ///
    /// This should only be called by the routing stage.
    pub fn set_route(&mut self, route: Arc<Route>) {
        self.route = Some(route);
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the wall-clock time the request was received.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Builds the structured error response for this request.
    #[must_use]
    pub fn reject(&self, error: GatewayError) -> Response {
        error.to_response(self.request_id)
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }
}

impl Default for MiddlewareContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_new_context_has_anonymous_identity() {
        let ctx = MiddlewareContext::new();
        assert!(ctx.identity().is_anonymous());
        assert!(ctx.route().is_none());
        assert!(ctx.client_ip().is_none());
    }

    #[test]
    fn test_for_client() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let ctx = MiddlewareContext::for_client(Some(ip));
        assert_eq!(ctx.client_ip(), Some(ip));
    }

    #[test]
    fn test_set_trace_context() {
        let mut ctx = MiddlewareContext::new();
        ctx.set_trace_id("abc123".to_string());
        ctx.set_span_id("def456".to_string());

        assert_eq!(ctx.trace_id(), Some("abc123"));
        assert_eq!(ctx.span_id(), Some("def456"));
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct ParentSpan(String);

        let mut ctx = MiddlewareContext::new();
        assert!(ctx.get_extension::<ParentSpan>().is_none());

        ctx.set_extension(ParentSpan("b7ad6b7169203331".to_string()));
        assert_eq!(
            ctx.get_extension::<ParentSpan>(),
            Some(&ParentSpan("b7ad6b7169203331".to_string()))
        );
    }

    #[test]
    fn test_reject_uses_request_id() {
        let ctx = MiddlewareContext::new();
        let response = ctx.reject(GatewayError::Unauthenticated);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();

        assert_eq!(response.status(), http::StatusCode::UNAUTHORIZED);
        assert_eq!(body["requestId"], ctx.request_id().to_string());
    }
}
