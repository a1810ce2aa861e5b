//! Error types for the gateway.
//!
//! This module provides [`GatewayError`], the error returned for every request
//! the gateway refuses or fails to complete, and [`ErrorEnvelope`], the JSON
//! body sent to callers.
//!
//! # Status mapping
//!
//! | `ErrorKind` | Status | Touches breaker |
//! |---|---|---|
//! | `NotFound` | 404 | no |
//! | `Validation` | 400 | no |
//! | `Unauthenticated` | 401 | no |
//! | `Forbidden` | 403 | no |
//! | `RateLimited` | 429 | no |
//! | `Unavailable` | 503 | no |
//! | `Timeout` | 408 | yes |
//! | `Handler` | 500 | yes |
//!
//! # Envelope
//!
//! ```json
//! {
//!   "error": "serviceId: invalid UUID format",
//!   "requestId": "01890f4e-…",
//!   "timestamp": "2026-10-16T12:00:00Z",
//!   "status": 400
//! }
//! ```

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http::{header, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::handler::Response;
use crate::RequestId;

/// Result type alias using [`GatewayError`].
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Categories of gateway errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No endpoint matches the request.
    NotFound,
    /// Content-type or body schema check failed.
    Validation,
    /// The endpoint requires a caller identity and none was supplied.
    Unauthenticated,
    /// The caller holds none of the endpoint's allowed roles.
    Forbidden,
    /// The endpoint's rate-limit policy rejected the request.
    RateLimited,
    /// The route's circuit breaker is open.
    Unavailable,
    /// The handler exceeded the endpoint timeout.
    Timeout,
    /// The handler failed.
    Handler,
}

impl ErrorKind {
    /// Returns the fixed HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::REQUEST_TIMEOUT,
            Self::Handler => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` if this outcome counts as a failure of the route itself.
    ///
    /// Only timeouts and handler errors are reported to the circuit breaker.
    #[must_use]
    pub const fn is_service_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::Handler)
    }
}

/// Error produced by the gateway for a single request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No endpoint registered for the path and method.
    #[error("Endpoint not found: {method} {path}")]
    NotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// The request failed validation.
    #[error("{message}")]
    Validation {
        /// Human-readable reason, `field: reason` pairs joined by commas.
        message: String,
    },

    /// Authentication required.
    #[error("Authentication required")]
    Unauthenticated,

    /// Role check failed.
    #[error("Insufficient permissions")]
    Forbidden {
        /// Roles that would have been accepted.
        allowed_roles: Vec<String>,
    },

    /// Rate limit exceeded.
    #[error("Too many requests")]
    RateLimited {
        /// Seconds until the window admits another request.
        retry_after_secs: u64,
    },

    /// Circuit breaker open for the route.
    #[error("Service temporarily unavailable")]
    Unavailable {
        /// The route whose breaker rejected the request.
        route: String,
    },

    /// Handler exceeded its deadline.
    #[error("Request timeout after {}ms", timeout.as_millis())]
    Timeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// Handler returned an error or panicked.
    #[error("Handler error: {message}")]
    Handler {
        /// Internal error message (logged, never sent to callers).
        message: String,
    },
}

impl GatewayError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::NotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a handler error.
    #[must_use]
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Unavailable { .. } => ErrorKind::Unavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Handler { .. } => ErrorKind::Handler,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind().status_code()
    }

    /// Returns the message that is safe to show to callers.
    ///
    /// Handler internals are replaced with a generic message.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Handler { .. } => "Gateway error".to_string(),
            Self::Timeout { .. } => "Request timeout".to_string(),
            other => other.to_string(),
        }
    }

    /// Converts this error to the JSON envelope sent to callers.
    #[must_use]
    pub fn to_envelope(&self, request_id: RequestId, timestamp: DateTime<Utc>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.public_message(),
            request_id: request_id.to_string(),
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            status: self.status_code().as_u16(),
        }
    }

    /// Builds the HTTP response carrying the error envelope.
    ///
    /// The error itself is attached as a response extension so outer
    /// pipeline stages can classify the outcome without parsing the body.
    #[must_use]
    pub fn to_response(&self, request_id: RequestId) -> Response {
        let envelope = self.to_envelope(request_id, Utc::now());
        let body = serde_json::to_vec(&envelope).unwrap_or_default();

        let mut response = Response::new(Bytes::from(body));
        *response.status_mut() = self.status_code();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Self::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }
        response.extensions_mut().insert(self.clone());
        response
    }
}

/// JSON body of every structured gateway error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Caller-safe error message.
    pub error: String,
    /// Request id to quote when escalating.
    pub request_id: String,
    /// RFC 3339 timestamp of the failure.
    pub timestamp: String,
    /// HTTP status code.
    pub status: u16,
}

/// Errors raised while building the endpoint registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The same (path, method) pair was registered twice.
    #[error("duplicate endpoint: {method} {path}")]
    Duplicate {
        /// Method of the duplicate endpoint.
        method: String,
        /// Path of the duplicate endpoint.
        path: String,
    },

    /// The endpoint path is not absolute.
    #[error("endpoint path must start with '/': {0}")]
    InvalidPath(String),

    /// The endpoint declares a zero timeout.
    #[error("endpoint timeout must be greater than zero: {method} {path}")]
    ZeroTimeout {
        /// Method of the endpoint.
        method: String,
        /// Path of the endpoint.
        path: String,
    },
}
