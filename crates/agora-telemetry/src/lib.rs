//! Observability for the Agora gateway.
//!
//! - **Logging**: structured JSON or pretty logs via `tracing-subscriber`
//! - **Metrics**: Prometheus-format counters and histograms via the `metrics` crate
//! - **Request log**: bounded rolling [`MetricsRecorder`] aggregated into a [`MetricsSnapshot`]
//! - **Health board**: latest [`HealthCheckResult`] per critical route
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_telemetry::{init_telemetry, LogConfig, MetricsConfig};
//!
//! init_telemetry(&LogConfig::default(), &MetricsConfig::default())?;
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod recorder;

pub use error::TelemetryError;
pub use health::{HealthCheckResult, HealthStatus};
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, render_metrics, MetricsConfig};
pub use recorder::{MetricsRecorder, MetricsSnapshot, RecorderConfig, RequestMetric, RouteVolume};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(logging: &LogConfig, metrics: &MetricsConfig) -> TelemetryResult<()> {
    init_logging(logging)?;
    init_metrics(metrics)?;
    Ok(())
}
