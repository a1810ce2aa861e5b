//! Top-level gateway configuration.

use agora_core::EndpointDefinition;
use agora_telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

use crate::{
    BreakerSection, ConfigError, EndpointConfig, HealthSection, MetricsSection, RateLimitSection,
    RouterSection, ServerSection, TelemetrySection,
};

/// Complete gateway configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use agora_config::GatewayConfig;
///
/// let config = GatewayConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.breaker.failure_threshold, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// HTTP front end.
    #[serde(default)]
    pub server: ServerSection,

    /// Circuit breaker thresholds.
    #[serde(default)]
    pub breaker: BreakerSection,

    /// Dispatch settings.
    #[serde(default)]
    pub router: RouterSection,

    /// Request log retention.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Health probing.
    #[serde(default)]
    pub health: HealthSection,

    /// Rate limit enforcement.
    #[serde(default)]
    pub rate_limit: RateLimitSection,

    /// Logging and Prometheus.
    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Endpoints declared in configuration.
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl GatewayConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first problem found:
    /// - `server.http_addr` is not a socket address
    /// - a threshold, interval or capacity is zero
    /// - a critical route is not an absolute path
    /// - an endpoint declaration is invalid or duplicated
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.http_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        let positive = [
            ("server.body_timeout_secs", self.server.body_timeout_secs),
            ("breaker.failure_threshold", u64::from(self.breaker.failure_threshold)),
            ("breaker.recovery_window_secs", self.breaker.recovery_window_secs),
            ("router.default_timeout_ms", self.router.default_timeout_ms),
            ("metrics.max_entries", self.metrics.max_entries as u64),
            ("metrics.retention_secs", self.metrics.retention_secs),
            ("metrics.sweep_interval_secs", self.metrics.sweep_interval_secs),
            ("health.interval_secs", self.health.interval_secs),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::invalid_value(field, "must be greater than zero"));
            }
        }

        if self.breaker.half_open_max_trials == Some(0) {
            return Err(ConfigError::invalid_value(
                "breaker.half_open_max_trials",
                "must be greater than zero when set",
            ));
        }

        if let Some(route) = self
            .health
            .critical_routes
            .iter()
            .find(|route| !route.starts_with('/'))
        {
            return Err(ConfigError::invalid_value(
                "health.critical_routes",
                format!("path must start with '/': {route}"),
            ));
        }

        self.endpoint_definitions().map(|_| ())
    }

    /// Converts the declared endpoints into definitions.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEndpoint` for an invalid or duplicated
    /// declaration.
    pub fn endpoint_definitions(&self) -> Result<Vec<EndpointDefinition>, ConfigError> {
        let mut seen = HashSet::new();
        self.endpoints
            .iter()
            .map(|endpoint| {
                let definition = endpoint.to_definition()?;
                if !seen.insert((definition.method().clone(), definition.path().to_string())) {
                    return Err(ConfigError::invalid_endpoint(
                        &endpoint.method,
                        &endpoint.path,
                        "declared more than once",
                    ));
                }
                Ok(definition)
            })
            .collect()
    }

    /// Create a development configuration preset.
    ///
    /// Binds to loopback, logs pretty at debug level and probes every 5s.
    ///
    /// # Example
    ///
    /// ```
    /// use agora_config::GatewayConfig;
    ///
    /// let config = GatewayConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.server.http_addr = "127.0.0.1:8080".to_string();
        config.telemetry.logging = LogConfig::development();
        config.health.interval_secs = 5;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_telemetry::LogFormat;

    fn endpoint(method: &str, path: &str) -> EndpointConfig {
        EndpointConfig {
            path: path.to_string(),
            method: method.to_string(),
            timeout_ms: None,
            requires_auth: false,
            allowed_roles: None,
            rate_limit: None,
            schema: None,
        }
    }

    #[test]
    fn test_default_is_valid() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_development_preset() {
        let config = GatewayConfig::development();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert_eq!(config.server.http_addr, "127.0.0.1:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_addr() {
        let mut config = GatewayConfig::default();
        config.server.http_addr = "localhost".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "server.http_addr"
        ));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = GatewayConfig::default();
        config.breaker.failure_threshold = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "breaker.failure_threshold"
        ));
    }

    #[test]
    fn test_zero_max_entries_rejected() {
        let mut config = GatewayConfig::default();
        config.metrics.max_entries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_half_open_trials_rejected() {
        let mut config = GatewayConfig::default();
        config.breaker.half_open_max_trials = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_relative_critical_route_rejected() {
        let mut config = GatewayConfig::default();
        config.health.critical_routes = vec!["api/health".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let mut config = GatewayConfig::default();
        config.endpoints = vec![
            endpoint("GET", "/api/services"),
            endpoint("get", "/api/services"),
        ];
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { reason, .. }) if reason == "declared more than once"
        ));
    }

    #[test]
    fn test_same_path_different_methods() {
        let mut config = GatewayConfig::default();
        config.endpoints = vec![
            endpoint("GET", "/api/bookings"),
            endpoint("POST", "/api/bookings"),
        ];
        assert_eq!(config.endpoint_definitions().unwrap().len(), 2);
    }
}
