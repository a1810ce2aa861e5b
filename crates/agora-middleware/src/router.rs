//! Timeout-bounded dispatch.
//!
//! [`TimeoutRouter::dispatch`] runs a route's handler on its own task and
//! races it against the endpoint timeout. When the timer wins, the handler's
//! [`CancellationToken`] is cancelled and the task is aborted, so neither the
//! timer nor the handler outlives the call. A handler that panics is reported
//! as a handler error.

use agora_core::{GatewayError, HandlerError, Request, Response, Route, DEFAULT_TIMEOUT};
use std::any::Any;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

/// Dispatches requests to handlers under a deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutRouter {
    default_timeout: Duration,
}

impl Default for TimeoutRouter {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

/// Aborts the handler task if the dispatch future is dropped early.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl TimeoutRouter {
    /// Creates a router applying `default_timeout` to endpoints without one.
    #[must_use]
    pub const fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Returns the timeout that applies to `route`.
    #[must_use]
    pub fn timeout_for(&self, route: &Route) -> Duration {
        route.definition().timeout_or(self.default_timeout)
    }

    /// Invokes the route's handler, bounded by its timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Timeout`] when the deadline passes first, and
    /// [`GatewayError::Handler`] when the handler fails or panics.
    pub async fn dispatch(
        &self,
        route: &Route,
        request: Request,
    ) -> Result<Response, GatewayError> {
        let timeout = self.timeout_for(route);
        let handler = route.handler();
        let cancel = CancellationToken::new();

        let mut task = tokio::spawn({
            let cancel = cancel.clone();
            async move { handler.call(request, cancel).await }
        });
        let _guard = AbortOnDrop(task.abort_handle());

        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(err))) => Err(GatewayError::handler(err.to_string())),
            Ok(Err(join_err)) => {
                let err = if join_err.is_panic() {
                    HandlerError::Panicked(panic_message(join_err.into_panic()))
                } else {
                    HandlerError::Cancelled
                };
                Err(GatewayError::handler(err.to_string()))
            }
            Err(_elapsed) => {
                cancel.cancel();
                task.abort();
                Err(GatewayError::Timeout { timeout })
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => payload
            .downcast_ref::<&'static str>()
            .map_or_else(|| "unknown panic".to_string(), ToString::to_string),
    }
}
