//! Configuration section types.
//!
//! Every field has a default, so a file only needs to name what it changes.

use agora_telemetry::{LogConfig, MetricsConfig, RecorderConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP front end settings.
///
/// # Example
///
/// ```
/// use agora_config::ServerSection;
///
/// let server = ServerSection {
///     http_addr: "127.0.0.1:3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(server.shutdown_timeout_secs, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Bind address (e.g. "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// How long the server waits for a request body, in seconds.
    #[serde(default = "default_body_timeout")]
    pub body_timeout_secs: u64,

    /// Value of the `X-Gateway-Version` response header.
    #[serde(default = "default_version")]
    pub version: String,

    /// Reuse a caller-supplied `X-Request-ID` instead of minting one.
    #[serde(default)]
    pub trust_incoming_request_id: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            body_timeout_secs: default_body_timeout(),
            version: default_version(),
            trust_incoming_request_id: false,
        }
    }
}

impl ServerSection {
    /// Graceful shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Request body read timeout.
    #[must_use]
    pub const fn body_timeout(&self) -> Duration {
        Duration::from_secs(self.body_timeout_secs)
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_body_timeout() -> u64 {
    30
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Circuit breaker thresholds, shared by every route.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BreakerSection {
    /// Consecutive failures that open a breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open breaker waits before admitting trial requests.
    #[serde(default = "default_recovery_window")]
    pub recovery_window_secs: u64,

    /// Cap on concurrent trial requests while half-open. Unset admits all.
    #[serde(default)]
    pub half_open_max_trials: Option<u32>,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_window_secs: default_recovery_window(),
            half_open_max_trials: None,
        }
    }
}

impl BreakerSection {
    /// Recovery window as a duration.
    #[must_use]
    pub const fn recovery_window(&self) -> Duration {
        Duration::from_secs(self.recovery_window_secs)
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_window() -> u64 {
    60
}

/// Dispatch settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RouterSection {
    /// Timeout for endpoints that do not declare one, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl RouterSection {
    /// Default dispatch timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Request log retention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Maximum number of retained request metrics.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Maximum age of a retained metric, in seconds.
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// How often the retention sweep runs, in seconds.
    #[serde(default = "default_retention")]
    pub sweep_interval_secs: u64,

    /// Number of routes reported by volume in the snapshot.
    #[serde(default = "default_top_routes")]
    pub top_routes: usize,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            retention_secs: default_retention(),
            sweep_interval_secs: default_retention(),
            top_routes: default_top_routes(),
        }
    }
}

impl MetricsSection {
    /// Recorder limits for this section.
    #[must_use]
    pub const fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            max_entries: self.max_entries,
            retention: Duration::from_secs(self.retention_secs),
            top_routes: self.top_routes,
        }
    }

    /// Interval between retention sweeps.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_max_entries() -> usize {
    10_000
}

fn default_retention() -> u64 {
    3600
}

fn default_top_routes() -> usize {
    10
}

/// Synthetic health probing of critical routes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct HealthSection {
    /// Whether the periodic probe runs.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between probe cycles.
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,

    /// Paths probed with `GET` on every cycle.
    #[serde(default = "default_critical_routes")]
    pub critical_routes: Vec<String>,

    /// A successful probe slower than this is reported as degraded.
    #[serde(default)]
    pub degraded_threshold_ms: Option<u64>,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval(),
            critical_routes: default_critical_routes(),
            degraded_threshold_ms: None,
        }
    }
}

impl HealthSection {
    /// Interval between probe cycles.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Latency above which a successful probe is degraded.
    #[must_use]
    pub fn degraded_threshold(&self) -> Option<Duration> {
        self.degraded_threshold_ms.map(Duration::from_millis)
    }
}

fn default_true() -> bool {
    true
}

fn default_health_interval() -> u64 {
    30
}

fn default_critical_routes() -> Vec<String> {
    vec!["/api/health".to_string()]
}

/// Rate limit enforcement.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSection {
    /// Whether declared endpoint policies are enforced with 429.
    #[serde(default)]
    pub enforce: bool,
}

/// Logging and Prometheus settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Log filter and output format.
    #[serde(default)]
    pub logging: LogConfig,

    /// Prometheus recorder settings.
    #[serde(default)]
    pub prometheus: MetricsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let server = ServerSection::default();
        assert_eq!(server.http_addr, "0.0.0.0:8080");
        assert_eq!(server.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(server.body_timeout(), Duration::from_secs(30));
        assert_eq!(server.version, env!("CARGO_PKG_VERSION"));
        assert!(!server.trust_incoming_request_id);
    }

    #[test]
    fn test_breaker_defaults() {
        let breaker = BreakerSection::default();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.recovery_window(), Duration::from_secs(60));
        assert_eq!(breaker.half_open_max_trials, None);
    }

    #[test]
    fn test_recorder_config_from_section() {
        let section = MetricsSection {
            max_entries: 50,
            retention_secs: 120,
            ..Default::default()
        };
        let recorder = section.recorder_config();
        assert_eq!(recorder.max_entries, 50);
        assert_eq!(recorder.retention, Duration::from_secs(120));
        assert_eq!(recorder.top_routes, 10);
        assert_eq!(section.sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_health_partial_section_keeps_defaults() {
        let health: HealthSection = toml::from_str("degraded_threshold_ms = 750").unwrap();
        assert!(health.enabled);
        assert_eq!(health.interval(), Duration::from_secs(30));
        assert_eq!(health.critical_routes, ["/api/health"]);
        assert_eq!(health.degraded_threshold(), Some(Duration::from_millis(750)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<RouterSection, _> = toml::from_str("default_timeout = 10");
        assert!(result.is_err());
    }
}
