//! Server errors.

use std::io;
use std::net::AddrParseError;
use thiserror::Error;

/// Errors raised while starting or running the HTTP front end.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The configured listen address does not parse.
    #[error("invalid listen address '{addr}': {source}")]
    InvalidAddress {
        /// The configured address.
        addr: String,
        /// Parse failure.
        #[source]
        source: AddrParseError,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address being bound.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// An OS signal handler could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
