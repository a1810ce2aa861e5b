//! Endpoint declarations.
//!
//! Endpoints can be declared in the configuration file instead of code. A
//! declaration carries policy only; the handler is bound at startup.
//!
//! ```toml
//! [[endpoints]]
//! path = "/api/bookings"
//! method = "POST"
//! timeout_ms = 5000
//! requires_auth = true
//! allowed_roles = ["customer"]
//!
//! [endpoints.rate_limit]
//! window_secs = 60
//! max_requests = 20
//!
//! [[endpoints.schema.fields]]
//! name = "serviceId"
//! type = "string"
//! format = "uuid"
//! ```

use agora_core::{EndpointDefinition, RateLimitPolicy, Schema};
use http::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// A declared endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Exact request path.
    pub path: String,

    /// HTTP method, case-insensitive.
    pub method: String,

    /// Dispatch timeout in milliseconds. Unset uses the router default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Whether an anonymous caller is rejected.
    #[serde(default)]
    pub requires_auth: bool,

    /// Roles admitted to the endpoint. Unset admits any caller.
    #[serde(default)]
    pub allowed_roles: Option<Vec<String>>,

    /// Declared rate limit.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// Body schema for body-carrying methods.
    #[serde(default)]
    pub schema: Option<Schema>,
}

/// A declared rate limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    pub window_secs: u64,
    /// Requests admitted per window.
    pub max_requests: u32,
}

impl EndpointConfig {
    /// Parses the declared method.
    pub fn parsed_method(&self) -> Result<Method, ConfigError> {
        match self.method.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "PATCH" => Ok(Method::PATCH),
            "DELETE" => Ok(Method::DELETE),
            "HEAD" => Ok(Method::HEAD),
            "OPTIONS" => Ok(Method::OPTIONS),
            _ => Err(self.invalid("unknown method")),
        }
    }

    /// Checks the declaration and converts it into an [`EndpointDefinition`].
    pub fn to_definition(&self) -> Result<EndpointDefinition, ConfigError> {
        let method = self.parsed_method()?;
        if !self.path.starts_with('/') {
            return Err(self.invalid("path must start with '/'"));
        }

        let mut definition = EndpointDefinition::new(method, self.path.clone());

        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms == 0 {
                return Err(self.invalid("timeout_ms must be greater than zero"));
            }
            definition = definition.with_timeout(Duration::from_millis(timeout_ms));
        }
        if self.requires_auth {
            definition = definition.requiring_auth();
        }
        if let Some(roles) = &self.allowed_roles {
            definition = definition.with_allowed_roles(roles.iter().cloned());
        }
        if let Some(limit) = self.rate_limit {
            if limit.window_secs == 0 || limit.max_requests == 0 {
                return Err(
                    self.invalid("rate_limit window and max_requests must be greater than zero")
                );
            }
            definition = definition.with_rate_limit(RateLimitPolicy::new(
                limit.max_requests,
                Duration::from_secs(limit.window_secs),
            ));
        }
        if let Some(schema) = &self.schema {
            definition = definition.with_schema(schema.clone());
        }

        Ok(definition)
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::invalid_endpoint(&self.method, &self.path, reason)
    }
}
