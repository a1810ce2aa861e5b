//! Prometheus metrics for the gateway.
//!
//! Recording goes through the `metrics` facade and is a no-op until
//! [`init_metrics`] installs the Prometheus recorder.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `agora_requests_total` | Counter | `route`, `method`, `status` |
//! | `agora_request_duration_seconds` | Histogram | `route` |
//! | `agora_breaker_transitions_total` | Counter | `route`, `to` |
//! | `agora_health_probe_total` | Counter | `route`, `status` |
//! | `agora_validation_failures_total` | Counter | `route` |

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Prometheus configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether the Prometheus recorder is installed.
    pub enabled: bool,

    /// Histogram buckets for request duration, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ],
        }
    }
}

/// Installs the Prometheus recorder.
///
/// Calling this more than once keeps the first recorder.
///
/// # Errors
///
/// Returns `TelemetryError::MetricsInit` if the recorder cannot be built or
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled || METRICS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .set_buckets(&config.duration_buckets)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "agora_requests_total",
        "Total number of requests processed by the gateway"
    );
    describe_histogram!(
        "agora_request_duration_seconds",
        "Gateway request duration in seconds"
    );
    describe_counter!(
        "agora_breaker_transitions_total",
        "Circuit breaker state transitions by route and target state"
    );
    describe_counter!(
        "agora_health_probe_total",
        "Health probe outcomes by route and status"
    );
    describe_counter!(
        "agora_validation_failures_total",
        "Requests rejected by body validation"
    );
}

/// Records a completed request.
pub fn record_request(route: &str, method: &str, status_code: u16, duration: Duration) {
    counter!(
        "agora_requests_total",
        "route" => route.to_string(),
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "agora_request_duration_seconds",
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a circuit breaker transition.
pub fn record_breaker_transition(route: &str, to: &'static str) {
    counter!(
        "agora_breaker_transitions_total",
        "route" => route.to_string(),
        "to" => to
    )
    .increment(1);
}

/// Records a health probe outcome.
pub fn record_health_probe(route: &str, status: &'static str) {
    counter!(
        "agora_health_probe_total",
        "route" => route.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Records a validation failure.
pub fn record_validation_failure(route: &str) {
    counter!(
        "agora_validation_failures_total",
        "route" => route.to_string()
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(!config.duration_buckets.is_empty());
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_request("/api/bookings", "POST", 201, Duration::from_millis(12));
        record_breaker_transition("/api/bookings", "open");
        record_health_probe("/api/health", "healthy");
        record_validation_failure("/api/bookings");
    }

    #[test]
    fn test_disabled_metrics_is_noop() {
        let config = MetricsConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_metrics(&config).is_ok());
    }
}
