//! Typed configuration for the Agora gateway.
//!
//! [`GatewayConfig`] is loaded in layers by [`ConfigLoader`]: defaults, then a
//! TOML or JSON file, then `PREFIX__SECTION__KEY` environment variables.
//! Unknown fields are rejected and the result is validated before use.
//!
//! # Example
//!
//! ```no_run
//! use agora_config::ConfigLoader;
//!
//! # fn main() -> Result<(), agora_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("gateway.toml")?
//!     .with_dotenv()
//!     .with_env_prefix("AGORA")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! body_timeout_secs = 30
//!
//! [breaker]
//! failure_threshold = 5
//! recovery_window_secs = 60
//!
//! [router]
//! default_timeout_ms = 30000
//!
//! [metrics]
//! max_entries = 10000
//! retention_secs = 3600
//!
//! [health]
//! interval_secs = 30
//! critical_routes = ["/api/health", "/api/payments/status"]
//!
//! [rate_limit]
//! enforce = true
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [[endpoints]]
//! path = "/api/auth/signin"
//! method = "POST"
//! rate_limit = { window_secs = 900, max_requests = 5 }
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `AGORA__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `AGORA__BREAKER__FAILURE_THRESHOLD=3`
//! - `AGORA__HEALTH__CRITICAL_ROUTES=/api/health,/api/payments/status`
//! - `AGORA__TELEMETRY__LOGGING__FORMAT=pretty`

#![warn(missing_docs)]

mod config;
mod endpoints;
mod error;
mod loader;
mod sections;

pub use config::GatewayConfig;
pub use endpoints::{EndpointConfig, RateLimitConfig};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use sections::{
    BreakerSection, HealthSection, MetricsSection, RateLimitSection, RouterSection, ServerSection,
    TelemetrySection,
};
