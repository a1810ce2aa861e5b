//! Pipeline stages.
//!
//! One module per stage, in pipeline order:
//!
//! 1. [`telemetry`] - request metric and gateway headers
//! 2. [`request_id`] - request id assignment
//! 3. [`trace_context`] - trace and span ids
//! 4. [`identity`] - upstream-resolved caller identity
//! 5. [`routing`] - endpoint lookup
//! 6. [`authorization`] - auth requirement and allowed roles
//! 7. [`validation`] - content type and body schema
//! 8. [`rate_limit`] - declared rate limits, when enforced
//! 9. [`circuit_breaker`] - per-route admission

pub mod authorization;
pub mod circuit_breaker;
pub mod identity;
pub mod rate_limit;
pub mod request_id;
pub mod routing;
pub mod telemetry;
pub mod trace_context;
pub mod validation;

pub use authorization::AuthorizationMiddleware;
pub use circuit_breaker::CircuitBreakerMiddleware;
pub use identity::{HeaderIdentityResolver, IdentityMiddleware, IdentityResolver};
pub use rate_limit::{RateLimitDecision, RateLimitMiddleware, RateLimiter};
pub use request_id::RequestIdMiddleware;
pub use routing::RoutingMiddleware;
pub use telemetry::TelemetryMiddleware;
pub use trace_context::{ParentSpan, TraceContext, TraceContextMiddleware};
pub use validation::{validate_request, UnreadableBody, ValidationMiddleware};
