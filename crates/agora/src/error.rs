//! Errors raised while assembling a gateway.

use agora_config::ConfigError;
use agora_core::RegistryError;
use thiserror::Error;

/// Result type for gateway assembly.
pub type BuildResult<T> = Result<T, BuildError>;

/// Errors that can occur while building a [`Gateway`](crate::Gateway).
#[derive(Debug, Error)]
pub enum BuildError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An endpoint could not be registered.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// An endpoint was declared in configuration but no handler was bound.
    #[error("no handler bound for declared endpoint {method} {path}")]
    MissingHandler {
        /// Declared method.
        method: String,
        /// Declared path.
        path: String,
    },
}

impl BuildError {
    /// Create a missing handler error.
    pub fn missing_handler(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::MissingHandler {
            method: method.into(),
            path: path.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_handler_message() {
        let err = BuildError::missing_handler("POST", "/api/bookings");
        assert_eq!(
            err.to_string(),
            "no handler bound for declared endpoint POST /api/bookings"
        );
    }

    #[test]
    fn test_registry_error_is_transparent() {
        let err: BuildError = RegistryError::InvalidPath("api".to_string()).into();
        assert_eq!(err.to_string(), "endpoint path must start with '/': api");
    }
}
