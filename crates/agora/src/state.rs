//! Shared gateway state.

use agora_core::EndpointRegistry;
use agora_middleware::{CircuitBreakerManager, RateLimiter, TimeoutRouter};
use agora_telemetry::MetricsRecorder;
use std::sync::Arc;

/// Owned state shared by the pipeline, the health prober and the periodic
/// tasks.
///
/// Built once at startup. Cloning is cheap and every clone sees the same
/// breakers, request log and limiter.
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// Read-only endpoint table.
    pub registry: Arc<EndpointRegistry>,
    /// Per-route breakers.
    pub breakers: Arc<CircuitBreakerManager>,
    /// Request log and health board.
    pub recorder: Arc<MetricsRecorder>,
    /// Sliding-window limiter, enforced only when configured.
    pub rate_limiter: Arc<RateLimiter>,
    /// Deadline-bounded dispatcher.
    pub router: TimeoutRouter,
}
