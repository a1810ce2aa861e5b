//! Fixed-order request pipeline.
//!
//! Every request flows through the same stages in the same order. Stages are
//! chosen by [`PipelineBuilder`] from the gateway's collaborators; callers
//! cannot reorder them.
//!
//! ## Stages
//!
//! 1. **Telemetry** - one `RequestMetric` per request, gateway headers
//! 2. **Request ID** - UUID v7, optionally reused from upstream
//! 3. **Trace context** - trace id reuse or generation, span id, log span
//! 4. **Identity** - caller identity resolved upstream
//! 5. **Routing** - exact `(path, method)` lookup (404)
//! 6. **Authorization** - auth requirement and allowed roles (401/403)
//! 7. **Validation** - content type and body schema (400)
//! 8. **Rate limit** - declared policies, only when enforced (429)
//! 9. **Circuit breaker** - per-route admission (503)
//!
//! The terminal step dispatches to the handler through the
//! [`TimeoutRouter`] (408 on timeout, 500 on handler failure).

use crate::breaker::CircuitBreakerManager;
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::router::TimeoutRouter;
use crate::stages::{
    AuthorizationMiddleware, CircuitBreakerMiddleware, IdentityMiddleware, IdentityResolver,
    RateLimitMiddleware, RateLimiter, RequestIdMiddleware, RoutingMiddleware,
    TelemetryMiddleware, TraceContextMiddleware, ValidationMiddleware,
};
use crate::types::{Request, Response};
use agora_core::{EndpointRegistry, GatewayError};
use agora_telemetry::MetricsRecorder;
use std::fmt;
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The fixed-order pipeline.
///
/// # Example
///
/// ```
/// use agora_core::EndpointRegistry;
/// use agora_middleware::breaker::{BreakerConfig, CircuitBreakerManager};
/// use agora_middleware::pipeline::Pipeline;
/// use agora_telemetry::{MetricsRecorder, RecorderConfig};
/// use std::sync::Arc;
///
/// let pipeline = Pipeline::builder(
///     Arc::new(EndpointRegistry::new()),
///     Arc::new(CircuitBreakerManager::new(BreakerConfig::default())),
///     Arc::new(MetricsRecorder::new(RecorderConfig::default())),
/// )
/// .build();
///
/// assert_eq!(pipeline.stage_names()[0], "telemetry");
/// assert_eq!(pipeline.stage_names().last(), Some(&"circuit_breaker"));
/// ```
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
    router: TimeoutRouter,
}

impl Pipeline {
    /// Creates a builder over the gateway's shared state.
    #[must_use]
    pub fn builder(
        registry: Arc<EndpointRegistry>,
        breakers: Arc<CircuitBreakerManager>,
        recorder: Arc<MetricsRecorder>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(registry, breakers, recorder)
    }

    /// Processes a request through every stage and the handler.
    pub async fn process(&self, mut ctx: MiddlewareContext, request: Request) -> Response {
        let next = self.build_chain();
        next.run(&mut ctx, request).await
    }

    fn build_chain(&self) -> Next<'_> {
        let router = self.router;
        let mut next = Next::terminal(move |ctx: &mut MiddlewareContext, request: Request| {
            dispatch(router, ctx, request)
        });

        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the router used for dispatch.
    #[must_use]
    pub fn router(&self) -> TimeoutRouter {
        self.router
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("stages", &self.stage_names())
            .field("router", &self.router)
            .finish()
    }
}

/// Terminal step: hands the request to the matched route's handler.
fn dispatch(
    router: TimeoutRouter,
    ctx: &mut MiddlewareContext,
    request: Request,
) -> BoxFuture<'static, Response> {
    let route = ctx.route().cloned();
    let request_id = ctx.request_id();

    Box::pin(async move {
        let Some(route) = route else {
            let err = GatewayError::not_found(request.method().as_str(), request.uri().path());
            return err.to_response(request_id);
        };

        match router.dispatch(&route, request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(
                    request_id = %request_id,
                    route = route.definition().path(),
                    error = %err,
                    "dispatch failed"
                );
                err.to_response(request_id)
            }
        }
    })
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder {
    registry: Arc<EndpointRegistry>,
    breakers: Arc<CircuitBreakerManager>,
    recorder: Arc<MetricsRecorder>,
    router: TimeoutRouter,
    version: String,
    trust_incoming_request_id: bool,
    identity: IdentityMiddleware,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl PipelineBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new(
        registry: Arc<EndpointRegistry>,
        breakers: Arc<CircuitBreakerManager>,
        recorder: Arc<MetricsRecorder>,
    ) -> Self {
        Self {
            registry,
            breakers,
            recorder,
            router: TimeoutRouter::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trust_incoming_request_id: false,
            identity: IdentityMiddleware::new(),
            rate_limiter: None,
        }
    }

    /// Sets the router used for dispatch.
    #[must_use]
    pub fn router(mut self, router: TimeoutRouter) -> Self {
        self.router = router;
        self
    }

    /// Sets the version sent in `X-Gateway-Version`.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Reuses a valid inbound `X-Request-ID` when `trust` is set.
    #[must_use]
    pub fn trust_incoming_request_id(mut self, trust: bool) -> Self {
        self.trust_incoming_request_id = trust;
        self
    }

    /// Replaces the default header-based identity resolver.
    #[must_use]
    pub fn identity_resolver(mut self, resolver: impl IdentityResolver) -> Self {
        self.identity = IdentityMiddleware::with_resolver(resolver);
        self
    }

    /// Enforces declared rate-limit policies with `limiter`.
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        let request_id = if self.trust_incoming_request_id {
            RequestIdMiddleware::trust_incoming()
        } else {
            RequestIdMiddleware::new()
        };

        let mut stages: Vec<BoxedMiddleware> = vec![
            Arc::new(TelemetryMiddleware::new(self.recorder, self.version)),
            Arc::new(request_id),
            Arc::new(TraceContextMiddleware::new()),
            Arc::new(self.identity),
            Arc::new(RoutingMiddleware::new(self.registry)),
            Arc::new(AuthorizationMiddleware::new()),
            Arc::new(ValidationMiddleware::new()),
        ];
        if let Some(limiter) = self.rate_limiter {
            stages.push(Arc::new(RateLimitMiddleware::new(limiter)));
        }
        stages.push(Arc::new(CircuitBreakerMiddleware::new(self.breakers)));

        Pipeline {
            stages,
            router: self.router,
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("router", &self.router)
            .field("version", &self.version)
            .field("trust_incoming_request_id", &self.trust_incoming_request_id)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Request metric and gateway headers.
    Telemetry = 1,
    /// Request id assignment.
    RequestId = 2,
    /// Trace and span ids.
    TraceContext = 3,
    /// Caller identity.
    Identity = 4,
    /// Endpoint lookup.
    Routing = 5,
    /// Auth requirement and roles.
    Authorization = 6,
    /// Content type and body schema.
    Validation = 7,
    /// Declared rate limits (optional).
    RateLimit = 8,
    /// Per-route admission.
    CircuitBreaker = 9,
}

impl Stage {
    /// Returns the stage name, matching [`Middleware::name`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::RequestId => "request_id",
            Self::TraceContext => "trace_context",
            Self::Identity => "identity",
            Self::Routing => "routing",
            Self::Authorization => "authorization",
            Self::Validation => "validation",
            Self::RateLimit => "rate_limit",
            Self::CircuitBreaker => "circuit_breaker",
        }
    }

    /// Returns `true` for stages that may be left out of a pipeline.
    #[must_use]
    pub const fn is_optional(self) -> bool {
        matches!(self, Self::RateLimit)
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 9] {
        [
            Self::Telemetry,
            Self::RequestId,
            Self::TraceContext,
            Self::Identity,
            Self::Routing,
            Self::Authorization,
            Self::Validation,
            Self::RateLimit,
            Self::CircuitBreaker,
        ]
    }
}
