//! Graceful shutdown signal handling.
//!
//! A [`ShutdownSignal`] is shared by the accept loop, every connection and
//! the binary's background tasks. Triggering it stops accepting new
//! connections and asks open ones to finish their in-flight request.
//!
//! # Example
//!
//! ```rust,ignore
//! use agora_server::ShutdownSignal;
//!
//! let shutdown = ShutdownSignal::with_os_signals()?;
//! tokio::select! {
//!     () = shutdown.recv() => println!("Shutdown signal received"),
//!     () = tokio::time::sleep(Duration::from_secs(60)) => println!("Timeout"),
//! }
//! ```

use tokio_util::sync::CancellationToken;

use crate::error::{ServerError, ServerResult};

/// A clonable, idempotent shutdown trigger.
///
/// # Example
///
/// ```rust
/// use agora_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let observer = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(observer.is_shutdown());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers shutdown. Calling this more than once has no further effect.
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Returns `true` once shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when shutdown is triggered, immediately if it already was.
    pub async fn recv(&self) {
        self.token.cancelled().await;
    }

    /// Creates a signal triggered by SIGTERM or SIGINT (Ctrl+C elsewhere).
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Signal`] if a handler cannot be installed.
    pub fn with_os_signals() -> ServerResult<Self> {
        let signal = Self::new();
        let trigger = signal.clone();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal as os_signal, SignalKind};

            let mut sigterm = os_signal(SignalKind::terminate()).map_err(ServerError::Signal)?;
            let mut sigint = os_signal(SignalKind::interrupt()).map_err(ServerError::Signal)?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
                }
                trigger.trigger();
            });
        }

        #[cfg(not(unix))]
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("received Ctrl+C, shutting down"),
                Err(err) => tracing::warn!(error = %err, "Ctrl+C handler failed, shutting down"),
            }
            trigger.trigger();
        });

        Ok(signal)
    }
}
