//! # Agora Middleware
//!
//! The request pipeline of the Agora gateway.
//!
//! Every request flows through the same fixed-order stages before it is
//! dispatched to its handler under a deadline:
//!
//! ```text
//! Request → Telemetry → RequestId → TraceContext → Identity → Routing
//!         → Authorization → Validation → [RateLimit] → CircuitBreaker → Router → Handler
//! ```
//!
//! | Stage | Middleware      | Rejects with |
//! |-------|-----------------|--------------|
//! | 1     | Telemetry       | -            |
//! | 2     | Request ID      | -            |
//! | 3     | Trace context   | -            |
//! | 4     | Identity        | -            |
//! | 5     | Routing         | 404          |
//! | 6     | Authorization   | 401 / 403    |
//! | 7     | Validation      | 400          |
//! | 8     | Rate limit      | 429          |
//! | 9     | Circuit breaker | 503          |
//! | -     | Router          | 408 / 500    |
//!
//! Validation, authorization and rate limiting all run before the breaker,
//! so caller mistakes never count as route failures.
//!
//! ## Example
//!
//! ```
//! use agora_middleware::pipeline::Stage;
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 9);
//! assert_eq!(stages[0].name(), "telemetry");
//! assert_eq!(stages[8].name(), "circuit_breaker");
//! ```

#![doc(html_root_url = "https://docs.rs/agora-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod breaker;
pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod router;
pub mod stages;
pub mod types;

pub use breaker::{
    BreakerConfig, BreakerPermit, BreakerSnapshot, BreakerState, CircuitBreakerManager,
};
pub use context::MiddlewareContext;
pub use middleware::{BoxFuture, Middleware, Next};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use router::TimeoutRouter;
pub use stages::{HeaderIdentityResolver, IdentityResolver, RateLimiter};
pub use types::{Request, Response};
