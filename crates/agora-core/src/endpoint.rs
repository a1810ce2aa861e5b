//! Endpoint definitions.
//!
//! An [`EndpointDefinition`] identifies a route by exact path and method and
//! carries the policy the gateway enforces before and around its handler:
//! body schema, auth requirement, allowed roles, rate-limit policy and
//! timeout. Definitions are immutable once registered.

use http::Method;
use std::time::Duration;

use crate::schema::Schema;

/// Timeout applied when an endpoint does not declare one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Declared rate-limit policy for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum requests admitted per window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimitPolicy {
    /// Creates a policy of `max_requests` per `window`.
    #[must_use]
    pub const fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Definition of a single gateway endpoint.
///
/// # Example
///
/// ```
/// use agora_core::{EndpointDefinition, RateLimitPolicy};
/// use http::Method;
/// use std::time::Duration;
///
/// let signin = EndpointDefinition::new(Method::POST, "/api/auth/signin")
///     .with_rate_limit(RateLimitPolicy::new(5, Duration::from_secs(15 * 60)))
///     .with_timeout(Duration::from_secs(10));
///
/// assert_eq!(signin.path(), "/api/auth/signin");
/// assert_eq!(signin.timeout_or(Duration::from_secs(30)), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDefinition {
    method: Method,
    path: String,
    schema: Option<Schema>,
    rate_limit: Option<RateLimitPolicy>,
    requires_auth: bool,
    allowed_roles: Option<Vec<String>>,
    timeout: Option<Duration>,
}

impl EndpointDefinition {
    /// Creates an endpoint with no schema, no auth, no rate limit and the
    /// default timeout.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            schema: None,
            rate_limit: None,
            requires_auth: false,
            allowed_roles: None,
            timeout: None,
        }
    }

    /// Attaches a request-body schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Attaches a rate-limit policy.
    #[must_use]
    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// Marks the endpoint as requiring a resolved caller identity.
    #[must_use]
    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Restricts the endpoint to callers holding one of `roles`.
    ///
    /// Implies [`requiring_auth`](Self::requiring_auth).
    #[must_use]
    pub fn with_allowed_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires_auth = true;
        self.allowed_roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the handler timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the body schema, if declared.
    #[must_use]
    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Returns the rate-limit policy, if declared.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitPolicy> {
        self.rate_limit
    }

    /// Returns `true` if the endpoint requires a caller identity.
    #[must_use]
    pub fn requires_auth(&self) -> bool {
        self.requires_auth
    }

    /// Returns the allowed roles, if restricted.
    #[must_use]
    pub fn allowed_roles(&self) -> Option<&[String]> {
        self.allowed_roles.as_deref()
    }

    /// Returns the declared timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the declared timeout or `default`.
    #[must_use]
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

/// Returns `true` for methods that conventionally carry a request body.
#[must_use]
pub fn carries_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}
