//! Synthetic health probing of critical routes.
//!
//! A probe is a `GET` dispatched in-process through the same
//! [`TimeoutRouter`] real traffic uses, so it honors the endpoint timeout.
//! It bypasses the pipeline: probes are not written to the request log and
//! never touch a breaker. Outcomes go to the recorder's health board only.
//!
//! | Outcome                                   | Status      | Response time |
//! |-------------------------------------------|-------------|---------------|
//! | 2xx within the degraded threshold         | `healthy`   | measured      |
//! | 2xx slower than the degraded threshold    | `degraded`  | measured      |
//! | any other status                          | `unhealthy` | measured      |
//! | timeout, handler error, no GET endpoint   | `unhealthy` | `0`           |

use agora_core::EndpointRegistry;
use agora_middleware::TimeoutRouter;
use agora_telemetry::metrics::record_health_probe;
use agora_telemetry::{HealthCheckResult, HealthStatus, MetricsRecorder};
use bytes::Bytes;
use chrono::Utc;
use http::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::state::GatewayState;

/// Header set on every probe request.
pub const PROBE_HEADER: &str = "x-gateway-probe";

/// Probes a fixed list of critical routes.
#[derive(Debug, Clone)]
pub struct HealthProber {
    registry: Arc<EndpointRegistry>,
    recorder: Arc<MetricsRecorder>,
    router: TimeoutRouter,
    routes: Vec<String>,
    degraded_threshold: Option<Duration>,
}

impl HealthProber {
    /// Creates a prober for `routes` over the gateway state.
    #[must_use]
    pub fn new(state: &GatewayState, routes: Vec<String>) -> Self {
        Self {
            registry: Arc::clone(&state.registry),
            recorder: Arc::clone(&state.recorder),
            router: state.router,
            routes,
            degraded_threshold: None,
        }
    }

    /// Reports successful probes slower than `threshold` as degraded.
    #[must_use]
    pub fn with_degraded_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.degraded_threshold = threshold;
        self
    }

    /// Returns the probed routes.
    #[must_use]
    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    /// Probes every critical route once, in order.
    pub async fn probe_all(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::with_capacity(self.routes.len());
        for route in &self.routes {
            results.push(self.probe(route).await);
        }
        results
    }

    /// Probes one route and replaces its health result.
    pub async fn probe(&self, path: &str) -> HealthCheckResult {
        let (status, response_time) = self.measure(path).await;

        let result = self.recorder.update_health(path, |previous| {
            HealthCheckResult::next(previous, path, status, response_time, Utc::now())
        });
        record_health_probe(path, status.as_str());

        match status {
            HealthStatus::Healthy => {
                debug!(
                    route = path,
                    response_time_ms = response_time.as_millis() as u64,
                    "route healthy"
                );
            }
            HealthStatus::Degraded | HealthStatus::Unhealthy => warn!(
                route = path,
                status = %status,
                response_time_ms = response_time.as_millis() as u64,
                error_count = result.error_count,
                "critical route not healthy"
            ),
        }
        result
    }

    async fn measure(&self, path: &str) -> (HealthStatus, Duration) {
        let Some(route) = self.registry.lookup(path, &Method::GET) else {
            warn!(route = path, "no GET endpoint registered for critical route");
            return (HealthStatus::Unhealthy, Duration::ZERO);
        };

        let request = match http::Request::builder()
            .method(Method::GET)
            .uri(path)
            .header(PROBE_HEADER, "true")
            .body(Bytes::new())
        {
            Ok(request) => request,
            Err(err) => {
                warn!(route = path, error = %err, "could not build probe request");
                return (HealthStatus::Unhealthy, Duration::ZERO);
            }
        };

        let started = Instant::now();
        match self.router.dispatch(&route, request).await {
            Ok(response) => {
                let elapsed = started.elapsed();
                let status = if !response.status().is_success() {
                    HealthStatus::Unhealthy
                } else if self.degraded_threshold.is_some_and(|limit| elapsed > limit) {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                (status, elapsed)
            }
            Err(err) => {
                warn!(route = path, error = %err, "health probe failed");
                (HealthStatus::Unhealthy, Duration::ZERO)
            }
        }
    }
}
