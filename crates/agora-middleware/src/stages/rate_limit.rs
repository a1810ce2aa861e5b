//! Rate limiting stage.
//!
//! Enforces the [`RateLimitPolicy`] declared on an endpoint. Only added to
//! the pipeline when enforcement is switched on; endpoints without a policy
//! pass through untouched.
//!
//! ## Algorithm
//!
//! Sliding window: each key keeps the count of the current fixed window and
//! of the previous one. The previous count is weighted by how much of it
//! still overlaps the sliding window, which smooths the burst a fixed window
//! allows at its boundary.
//!
//! Keys are `route|caller`, where the caller is the resolved user id, else
//! the client IP. A rejection is a caller mistake and never touches the
//! circuit breaker.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use agora_core::{GatewayError, RateLimitPolicy};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-key window bookkeeping.
#[derive(Debug, Clone, Copy)]
struct WindowData {
    /// Requests admitted in the current window.
    count: u64,
    /// Start of the current window.
    window_start: Instant,
    /// Requests admitted in the previous window.
    prev_count: u64,
    /// Window length, kept for pruning.
    window: Duration,
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Admitted; `remaining` more requests fit in the window.
    Allowed {
        /// Requests still available.
        remaining: u64,
    },
    /// Rejected until `retry_after` has passed.
    Limited {
        /// Time until the current window ends.
        retry_after: Duration,
    },
}

/// Sliding-window limiter shared by every request.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: DashMap<String, WindowData>,
}

impl RateLimiter {
    /// Creates an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `key` against `policy` and counts the request when admitted.
    pub fn check(&self, key: &str, policy: RateLimitPolicy) -> RateLimitDecision {
        self.check_at(key, policy, Instant::now())
    }

    fn check_at(&self, key: &str, policy: RateLimitPolicy, now: Instant) -> RateLimitDecision {
        let window = policy.window;
        let limit = u64::from(policy.max_requests);

        let mut data = self.windows.entry(key.to_string()).or_insert(WindowData {
            count: 0,
            window_start: now,
            prev_count: 0,
            window,
        });

        let elapsed = now.saturating_duration_since(data.window_start);
        if elapsed >= window {
            let windows_passed = elapsed.as_nanos() / window.as_nanos().max(1);
            data.prev_count = if windows_passed >= 2 { 0 } else { data.count };
            data.count = 0;
            data.window_start = if windows_passed >= 2 {
                now
            } else {
                data.window_start + window
            };
        }

        let in_window = now.saturating_duration_since(data.window_start);
        let progress = if window.is_zero() {
            1.0
        } else {
            in_window.as_secs_f64() / window.as_secs_f64()
        };

        #[allow(clippy::cast_sign_loss)]
        let weighted = data.count + (data.prev_count as f64 * (1.0 - progress).max(0.0)) as u64;

        if weighted >= limit {
            RateLimitDecision::Limited {
                retry_after: window.saturating_sub(in_window),
            }
        } else {
            data.count += 1;
            RateLimitDecision::Allowed {
                remaining: limit.saturating_sub(weighted + 1),
            }
        }
    }

    /// Drops keys idle for more than two windows.
    ///
    /// Returns the number of keys removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }

    fn prune_at(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, data| now.saturating_duration_since(data.window_start) < data.window * 2);
        before.saturating_sub(self.windows.len())
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns `true` if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Middleware that applies endpoint rate-limit policies.
#[derive(Debug, Clone, Default)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Creates the stage over a shared limiter.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    fn key(ctx: &MiddlewareContext, route: &str) -> String {
        let caller = match (ctx.identity().user_id(), ctx.client_ip()) {
            (Some(user_id), _) => format!("user:{user_id}"),
            (None, Some(ip)) => format!("ip:{ip}"),
            (None, None) => "unknown".to_string(),
        };
        format!("{route}|{caller}")
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
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
            let Some(policy) = route.definition().rate_limit() else {
                return next.run(ctx, request).await;
            };

            let key = Self::key(ctx, route.definition().path());
            match self.limiter.check(&key, policy) {
                RateLimitDecision::Allowed { .. } => next.run(ctx, request).await,
                RateLimitDecision::Limited { retry_after } => {
                    let retry_after_secs = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                    tracing::debug!(key = %key, retry_after_secs, "rate limit exceeded");
                    ctx.reject(GatewayError::RateLimited { retry_after_secs })
                }
            }
        })
    }
}
