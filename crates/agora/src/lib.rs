//! # Agora
//!
//! **Request gateway for the Agora services marketplace**
//!
//! Agora sits in front of the marketplace's in-process service handlers and
//! gives every endpoint the same protections:
//!
//! - **Schema validation**: malformed bodies are rejected with field-level reasons
//! - **Circuit breaking**: a failing route is cut off until it recovers
//! - **Deadlines**: every handler runs under a timeout with cooperative cancellation
//! - **Live health**: critical routes are probed in-process on a fixed interval
//! - **Request metrics**: a bounded rolling log aggregated for dashboards
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agora::prelude::*;
//! use agora::config::ConfigLoader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_file("agora.toml")?.load()?;
//!
//!     let gateway = Gateway::builder()
//!         .config(config)
//!         .handler(Method::GET, "/api/health", |_req: Request, _cancel: CancellationToken| async {
//!             Ok::<_, HandlerError>(Response::new(Bytes::from_static(b"ok")))
//!         })
//!         .build()?;
//!
//!     let tasks = gateway.start_background_tasks();
//!     let response = gateway.handle(request, Some(client_ip)).await;
//!     tasks.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Request → Telemetry → RequestId → TraceContext → Identity → Routing
//!         → Authorization → Validation → [RateLimit] → CircuitBreaker → Router → Handler
//! ```
//!
//! [`GatewayState`] owns the registry, breakers, request log and limiter. It
//! is built once by [`GatewayBuilder`] and shared by the pipeline, the
//! [`HealthProber`] and the [`BackgroundTasks`].

#![doc(html_root_url = "https://docs.rs/agora/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod error;
pub mod gateway;
pub mod health;
pub mod state;
pub mod tasks;

pub use agora_config as config;
pub use agora_core as core;
pub use agora_middleware as middleware;
pub use agora_telemetry as telemetry;

pub use agora_core::{
    CallerIdentity, EndpointDefinition, ErrorKind, GatewayError, Handler, HandlerError,
    RateLimitPolicy, Request, RequestId, Response, Schema,
};
pub use builder::GatewayBuilder;
pub use error::{BuildError, BuildResult};
pub use gateway::Gateway;
pub use health::{HealthProber, PROBE_HEADER};
pub use state::GatewayState;
pub use tasks::BackgroundTasks;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use agora::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{BackgroundTasks, BuildError, Gateway, GatewayBuilder, GatewayState};

    pub use agora_core::{
        CallerIdentity, EndpointDefinition, FieldRule, GatewayError, Handler, HandlerError,
        RateLimitPolicy, Request, RequestId, Response, Schema, StringFormat,
    };

    pub use agora_config::{ConfigLoader, GatewayConfig};
    pub use agora_middleware::{BreakerSnapshot, BreakerState, IdentityResolver};
    pub use agora_telemetry::{HealthCheckResult, HealthStatus, MetricsSnapshot};

    pub use bytes::Bytes;
    pub use http::{Method, StatusCode};
    pub use tokio_util::sync::CancellationToken;
}
