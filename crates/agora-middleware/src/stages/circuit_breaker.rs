//! Circuit breaker stage.
//!
//! Consults the route's breaker before dispatch and reports the outcome
//! afterwards. The outcome is read from the [`GatewayError`] that error
//! responses carry as an extension:
//!
//! - no error: success (a handler's own 5xx is still a completed call)
//! - timeout or handler error: failure
//! - anything else: not reported
//!
//! A rejection by an open breaker is never reported as a new failure. The
//! breaker permit is held across dispatch, so a request abandoned mid-flight
//! frees its half-open trial slot.

use crate::breaker::CircuitBreakerManager;
use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use agora_core::GatewayError;
use std::sync::Arc;

/// Middleware that gates dispatch on the route's breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerMiddleware {
    breakers: Arc<CircuitBreakerManager>,
}

impl CircuitBreakerMiddleware {
    /// Creates the stage over the shared breaker manager.
    #[must_use]
    pub fn new(breakers: Arc<CircuitBreakerManager>) -> Self {
        Self { breakers }
    }
}

impl Middleware for CircuitBreakerMiddleware {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(route) = ctx.route().cloned() else {
                return next.run(ctx, request).await;
            };
            let path = route.definition().path();

            let Some(permit) = self.breakers.acquire(path) else {
                tracing::debug!(route = path, "breaker open, request rejected");
                return ctx.reject(GatewayError::Unavailable {
                    route: path.to_string(),
                });
            };

            let response = next.run(ctx, request).await;
            match response.extensions().get::<GatewayError>() {
                None => permit.succeeded(),
                Some(err) if err.kind().is_service_failure() => permit.failed(),
                Some(_) => drop(permit),
            }
            response
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaker::{BreakerConfig, BreakerState};
    use agora_core::{EndpointDefinition, EndpointRegistry, HandlerError, Route};
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn route() -> Arc<Route> {
        let mut registry = EndpointRegistry::new();
        registry
            .register(
                EndpointDefinition::new(Method::GET, "/api/payouts"),
                |_req: Request, _cancel: CancellationToken| async {
                    Ok::<_, HandlerError>(Response::new(Bytes::new()))
                },
            )
            .unwrap();
        registry.lookup("/api/payouts", &Method::GET).unwrap()
    }

    async fn send(
        stage: &CircuitBreakerMiddleware,
        outcome: Option<GatewayError>,
        calls: &Arc<AtomicUsize>,
    ) -> Response {
        let mut ctx = MiddlewareContext::new();
        ctx.set_route(route());
        let calls = Arc::clone(calls);
        let next = Next::terminal(move |ctx, _req| {
            calls.fetch_add(1, Ordering::SeqCst);
            let response = match outcome {
                Some(err) => ctx.reject(err),
                None => Response::new(Bytes::new()),
            };
            Box::pin(async move { response })
        });
        stage.process(&mut ctx, Request::new(Bytes::new()), next).await
    }

    fn stage() -> (CircuitBreakerMiddleware, Arc<CircuitBreakerManager>) {
        let manager = Arc::new(CircuitBreakerManager::new(BreakerConfig {
            failure_threshold: 2,
            recovery_window: Duration::from_secs(60),
            half_open_max_trials: None,
        }));
        (CircuitBreakerMiddleware::new(Arc::clone(&manager)), manager)
    }

    #[tokio::test]
    async fn test_service_failures_open_the_breaker() {
        let (stage, manager) = stage();
        let calls = Arc::new(AtomicUsize::new(0));
        let timeout = GatewayError::Timeout {
            timeout: Duration::from_millis(100),
        };

        send(&stage, Some(timeout.clone()), &calls).await;
        send(&stage, Some(GatewayError::handler("boom")), &calls).await;
        assert_eq!(manager.state("/api/payouts"), BreakerState::Open);

        let response = send(&stage, None, &calls).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.failures("/api/payouts"), 2);
    }

    #[tokio::test]
    async fn test_caller_errors_are_not_reported() {
        let (stage, manager) = stage();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            send(&stage, Some(GatewayError::Unauthenticated), &calls).await;
        }
        assert_eq!(manager.failures("/api/payouts"), 0);
        assert_eq!(manager.state("/api/payouts"), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_does_not_wedge_half_open() {
        let manager = Arc::new(CircuitBreakerManager::new(BreakerConfig {
            failure_threshold: 2,
            recovery_window: Duration::from_secs(60),
            half_open_max_trials: Some(1),
        }));
        let stage = CircuitBreakerMiddleware::new(Arc::clone(&manager));
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            send(&stage, Some(GatewayError::handler("boom")), &calls).await;
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        let mut ctx = MiddlewareContext::new();
        ctx.set_route(route());
        let hung = Next::terminal(|_ctx, _req| Box::pin(std::future::pending::<Response>()));
        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            stage.process(&mut ctx, Request::new(Bytes::new()), hung),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(manager.state("/api/payouts"), BreakerState::HalfOpen);

        let response = send(&stage, None, &calls).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(manager.state("/api/payouts"), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_success_resets_failures() {
        let (stage, manager) = stage();
        let calls = Arc::new(AtomicUsize::new(0));

        send(&stage, Some(GatewayError::handler("boom")), &calls).await;
        assert_eq!(manager.failures("/api/payouts"), 1);
        send(&stage, None, &calls).await;
        assert_eq!(manager.failures("/api/payouts"), 0);
    }
}
