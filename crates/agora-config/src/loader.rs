//! Layered configuration loader.
//!
//! Layers apply in order, later ones overriding earlier ones:
//! 1. Defaults (or a preset)
//! 2. A TOML or JSON file
//! 3. Environment variables, optionally seeded from a `.env` file

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use agora_telemetry::LogFormat;

use crate::{ConfigError, GatewayConfig};

/// Configuration loader with layered approach.
///
/// # Example
///
/// ```no_run
/// use agora_config::ConfigLoader;
///
/// # fn main() -> Result<(), agora_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_file("gateway.toml")?
///     .with_dotenv()
///     .with_env_prefix("AGORA")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: GatewayConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader seeded with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            env_prefix: None,
        }
    }

    /// Start from the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use agora_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = GatewayConfig::development();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format is chosen by extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing or unreadable, has an
    /// unsupported extension, or does not parse (unknown fields included).
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.display().to_string()))?;
        self.config = parse(&content, format)?;

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the named format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the format is unknown or parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use agora_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [breaker]
    ///     failure_threshold = 3
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.breaker.failure_threshold, 3);
    /// assert_eq!(config.breaker.recovery_window_secs, 60);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, format)?;
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the form `PREFIX__SECTION__KEY`, e.g.
    /// `AGORA__BREAKER__FAILURE_THRESHOLD=3`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load variables from a `.env` file in the working directory, if any.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        // A missing .env is the common case.
        let _ = dotenvy::dotenv();
        self
    }

    /// Load variables from the given `.env` file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Dotenv` if the file cannot be read or parsed.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path)?;
        Ok(self)
    }

    /// Apply environment overrides, validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override does not parse or validation fails.
    pub fn load(mut self) -> Result<GatewayConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Return the configuration without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> GatewayConfig {
        self.config
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(prefix))
            .collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(rest) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            // Shares the prefix but not the separator, e.g. AGORA_HOME.
            return Ok(());
        };

        let parts: Vec<&str> = rest.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "BODY_TIMEOUT_SECS"] => {
                config.server.body_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "VERSION"] => config.server.version = value.to_string(),
            ["SERVER", "TRUST_INCOMING_REQUEST_ID"] => {
                config.server.trust_incoming_request_id = parse_flag(key, value)?;
            }

            ["BREAKER", "FAILURE_THRESHOLD"] => {
                config.breaker.failure_threshold = parse_number(key, value)?;
            }
            ["BREAKER", "RECOVERY_WINDOW_SECS"] => {
                config.breaker.recovery_window_secs = parse_number(key, value)?;
            }
            ["BREAKER", "HALF_OPEN_MAX_TRIALS"] => {
                config.breaker.half_open_max_trials = parse_optional_number(key, value)?;
            }

            ["ROUTER", "DEFAULT_TIMEOUT_MS"] => {
                config.router.default_timeout_ms = parse_number(key, value)?;
            }

            ["METRICS", "MAX_ENTRIES"] => config.metrics.max_entries = parse_number(key, value)?,
            ["METRICS", "RETENTION_SECS"] => {
                config.metrics.retention_secs = parse_number(key, value)?;
            }
            ["METRICS", "SWEEP_INTERVAL_SECS"] => {
                config.metrics.sweep_interval_secs = parse_number(key, value)?;
            }
            ["METRICS", "TOP_ROUTES"] => config.metrics.top_routes = parse_number(key, value)?,

            ["HEALTH", "ENABLED"] => config.health.enabled = parse_flag(key, value)?,
            ["HEALTH", "INTERVAL_SECS"] => config.health.interval_secs = parse_number(key, value)?,
            ["HEALTH", "CRITICAL_ROUTES"] => {
                config.health.critical_routes = value
                    .split(',')
                    .map(str::trim)
                    .filter(|route| !route.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["HEALTH", "DEGRADED_THRESHOLD_MS"] => {
                config.health.degraded_threshold_ms = parse_optional_number(key, value)?;
            }

            ["RATE_LIMIT", "ENFORCE"] => config.rate_limit.enforce = parse_flag(key, value)?,

            ["TELEMETRY", "LOGGING", "LEVEL"] => config.telemetry.logging.level = value.to_string(),
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_parse_error(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "PROMETHEUS", "ENABLED"] => {
                config.telemetry.prometheus.enabled = parse_flag(key, value)?;
            }

            // Endpoints are only declared in files.
            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<GatewayConfig, ConfigError> {
    match format.to_lowercase().as_str() {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        _ => Err(ConfigError::UnsupportedFormat(format.to_string())),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected non-negative integer"))
}

fn parse_optional_number<T: FromStr>(key: &str, value: &str) -> Result<Option<T>, ConfigError> {
    if value.is_empty() || value.eq_ignore_ascii_case("none") {
        Ok(None)
    } else {
        parse_number(key, value).map(Some)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn temp_config(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_loader_with_toml_file() {
        let file = temp_config(
            ".toml",
            r#"
                [server]
                http_addr = "127.0.0.1:9000"

                [health]
                critical_routes = ["/api/health", "/api/payments/status"]
                degraded_threshold_ms = 500

                [[endpoints]]
                path = "/api/payments/status"
                method = "GET"
                timeout_ms = 2000
            "#,
        );

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();

        assert_eq!(config.server.http_addr, "127.0.0.1:9000");
        assert_eq!(config.health.critical_routes.len(), 2);
        assert_eq!(config.health.degraded_threshold_ms, Some(500));
        assert_eq!(config.endpoints[0].timeout_ms, Some(2000));
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn test_loader_with_json_file() {
        let file = temp_config(".json", r#"{"rate_limit": {"enforce": true}}"#);
        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!(config.rate_limit.enforce);
    }

    #[test]
    fn test_loader_unknown_field_in_file() {
        let file = temp_config(".toml", "[breaker]\nthreshold = 3\n");
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_loader_unsupported_extension() {
        let file = temp_config(".yaml", "server: {}");
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/gateway.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/gateway.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.router.default_timeout_ms, 30_000);
    }

    #[test]
    fn test_loader_validates_on_load() {
        let result = ConfigLoader::new()
            .with_string("[metrics]\nmax_entries = 0", "toml")
            .unwrap()
            .load();
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_loader_load_unvalidated() {
        let config = ConfigLoader::new()
            .with_string("[metrics]\nmax_entries = 0", "toml")
            .unwrap()
            .load_unvalidated();
        assert_eq!(config.metrics.max_entries, 0);
    }

    #[test]
    fn test_loader_with_dotenv_file_missing() {
        let result = ConfigLoader::new().with_dotenv_file("/nonexistent/.env");
        assert!(matches!(result, Err(ConfigError::Dotenv(_))));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides are applied through apply_env_var directly so tests never
    // mutate the process environment.

    #[test]
    fn test_apply_env_var_server_timeouts() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("AGORA__SERVER__BODY_TIMEOUT_SECS", "5", "AGORA").unwrap();
        loader.apply_env_var("AGORA__SERVER__SHUTDOWN_TIMEOUT_SECS", "10", "AGORA").unwrap();
        assert_eq!(loader.config.server.body_timeout_secs, 5);
        assert_eq!(loader.config.server.shutdown_timeout_secs, 10);
    }

    #[test]
    fn test_apply_env_var_breaker() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("AGORA__BREAKER__FAILURE_THRESHOLD", "3", "AGORA").unwrap();
        loader.apply_env_var("AGORA__BREAKER__HALF_OPEN_MAX_TRIALS", "1", "AGORA").unwrap();
        assert_eq!(loader.config.breaker.failure_threshold, 3);
        assert_eq!(loader.config.breaker.half_open_max_trials, Some(1));

        loader.apply_env_var("AGORA__BREAKER__HALF_OPEN_MAX_TRIALS", "none", "AGORA").unwrap();
        assert_eq!(loader.config.breaker.half_open_max_trials, None);
    }

    #[test]
    fn test_apply_env_var_critical_routes() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var(
                "AGORA__HEALTH__CRITICAL_ROUTES",
                "/api/health, /api/payments/status,",
                "AGORA",
            )
            .unwrap();
        assert_eq!(
            loader.config.health.critical_routes,
            ["/api/health", "/api/payments/status"]
        );
    }

    #[test]
    fn test_apply_env_var_telemetry() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("AGORA__TELEMETRY__LOGGING__LEVEL", "debug", "AGORA").unwrap();
        loader.apply_env_var("AGORA__TELEMETRY__LOGGING__FORMAT", "pretty", "AGORA").unwrap();
        loader.apply_env_var("AGORA__TELEMETRY__PROMETHEUS__ENABLED", "no", "AGORA").unwrap();
        assert_eq!(loader.config.telemetry.logging.level, "debug");
        assert_eq!(loader.config.telemetry.logging.format, LogFormat::Pretty);
        assert!(!loader.config.telemetry.prometheus.enabled);
    }

    #[test]
    fn test_apply_env_var_invalid_values() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("AGORA__ROUTER__DEFAULT_TIMEOUT_MS", "soon", "AGORA")
            .is_err());
        assert!(loader.apply_env_var("AGORA__RATE_LIMIT__ENFORCE", "maybe", "AGORA").is_err());
        assert!(loader.apply_env_var("AGORA__TELEMETRY__LOGGING__FORMAT", "xml", "AGORA").is_err());
    }

    #[test]
    fn test_apply_env_var_ignores_unrelated_keys() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("AGORA_HOME", "/opt/agora", "AGORA").unwrap();
        loader.apply_env_var("AGORA__UNKNOWN__KEY", "1", "AGORA").unwrap();
        assert_eq!(loader.config, GatewayConfig::default());
    }
}
