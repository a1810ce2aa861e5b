//! Per-route circuit breakers.
//!
//! Each route has its own three-state breaker:
//!
//! - **Closed**: requests are admitted. A failure increments the consecutive
//!   failure count; reaching `failure_threshold` opens the breaker until
//!   `now + recovery_window`. A success resets the count.
//! - **Open**: requests are rejected without reaching the handler. The first
//!   admission check at or after the retry instant moves the breaker to
//!   half-open and admits that request.
//! - **HalfOpen**: requests are admitted (optionally capped by
//!   `half_open_max_trials`). A success closes the breaker with the count at
//!   zero. A failure is counted as in the closed state, so it re-opens the
//!   breaker once the count is at or above the threshold.
//!
//! [`CircuitBreakerManager::acquire`] hands out a [`BreakerPermit`]. A permit
//! dropped without an outcome (the request was cancelled, or ended in an
//! error the breaker does not count) gives its half-open trial slot back.
//!
//! State lives in a [`DashMap`] of per-route mutexes: transitions for one
//! route are serialized, unrelated routes never contend. Breakers are created
//! on first use and never removed, so the map is bounded by the number of
//! registered routes. Time is read from [`tokio::time::Instant`].

use agora_telemetry::metrics::record_breaker_transition;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Breaker tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// How long an open breaker rejects before allowing a trial.
    pub recovery_window: Duration,
    /// Maximum requests admitted while half-open. `None` admits all.
    pub half_open_max_trials: Option<u32>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_window: Duration::from_secs(60),
            half_open_max_trials: None,
        }
    }
}

/// State of a route's breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    /// Admitting normally.
    #[default]
    Closed,
    /// Rejecting all traffic.
    Open,
    /// Re-admitting traffic to test recovery.
    HalfOpen,
}

impl BreakerState {
    /// Returns the lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one route's breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakerSnapshot {
    /// Route path.
    pub route: String,
    /// Current state.
    pub state: BreakerState,
    /// Consecutive failure count.
    pub failures: u32,
    /// Wall-clock time of the most recent failure.
    pub last_failure: Option<DateTime<Utc>>,
    /// Milliseconds until an open breaker admits a trial request.
    pub retry_in_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct RouteBreaker {
    state: BreakerState,
    failures: u32,
    last_failure: Option<DateTime<Utc>>,
    next_attempt: Option<Instant>,
    half_open_trials: u32,
    // Bumped on every move to half-open so stale permits cannot release
    // slots of a later half-open period.
    half_open_epoch: u64,
}

enum Admission {
    Rejected,
    Admitted,
    /// Holds a half-open trial slot of the given epoch.
    Trial(u64),
}

/// Admission to one route's breaker, released on drop.
///
/// Report the outcome with [`succeeded`](Self::succeeded) or
/// [`failed`](Self::failed). Dropping the permit instead reports nothing and
/// returns any half-open trial slot it holds.
#[derive(Debug)]
#[must_use = "dropping a permit reports no outcome"]
pub struct BreakerPermit<'a> {
    breakers: &'a CircuitBreakerManager,
    route: &'a str,
    trial: Option<u64>,
}

impl BreakerPermit<'_> {
    /// Returns `true` if this permit holds a half-open trial slot.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        self.trial.is_some()
    }

    /// Records a completed request.
    pub fn succeeded(mut self) {
        self.trial = None;
        self.breakers.record_success(self.route);
    }

    /// Records a timeout or handler failure.
    pub fn failed(mut self) {
        self.trial = None;
        self.breakers.record_failure(self.route);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if let Some(epoch) = self.trial.take() {
            self.breakers.release_trial(self.route, epoch);
        }
    }
}

/// Owner of every route's breaker.
///
/// # Example
///
/// ```
/// use agora_middleware::breaker::{BreakerConfig, BreakerState, CircuitBreakerManager};
///
/// let breakers = CircuitBreakerManager::new(BreakerConfig::default());
/// for _ in 0..5 {
///     assert!(breakers.admit("/api/payments"));
///     breakers.record_failure("/api/payments");
/// }
/// assert_eq!(breakers.state("/api/payments"), BreakerState::Open);
/// assert!(!breakers.admit("/api/payments"));
/// ```
#[derive(Debug, Default)]
pub struct CircuitBreakerManager {
    config: BreakerConfig,
    routes: DashMap<String, Arc<Mutex<RouteBreaker>>>,
}

impl CircuitBreakerManager {
    /// Creates a manager applying `config` to every route.
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            routes: DashMap::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    fn breaker(&self, route: &str) -> Arc<Mutex<RouteBreaker>> {
        if let Some(existing) = self.routes.get(route) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.routes.entry(route.to_string()).or_default().value())
    }

    /// Decides whether a request to `route` may proceed.
    ///
    /// Moves an open breaker whose recovery window has elapsed to half-open.
    /// A half-open admission keeps its trial slot until
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure); prefer
    /// [`acquire`](Self::acquire) when the request may be abandoned.
    pub fn admit(&self, route: &str) -> bool {
        !matches!(self.enter(route), Admission::Rejected)
    }

    /// Admits a request to `route`, returning a permit for its outcome.
    ///
    /// Returns `None` when the breaker rejects the request.
    pub fn acquire<'a>(&'a self, route: &'a str) -> Option<BreakerPermit<'a>> {
        let trial = match self.enter(route) {
            Admission::Rejected => return None,
            Admission::Admitted => None,
            Admission::Trial(epoch) => Some(epoch),
        };
        Some(BreakerPermit {
            breakers: self,
            route,
            trial,
        })
    }

    fn enter(&self, route: &str) -> Admission {
        let breaker = self.breaker(route);
        let mut b = breaker.lock();

        let state = b.state;
        match state {
            BreakerState::Closed => Admission::Admitted,
            BreakerState::Open => {
                let due = b.next_attempt.map_or(true, |at| Instant::now() >= at);
                if !due {
                    return Admission::Rejected;
                }
                b.state = BreakerState::HalfOpen;
                b.next_attempt = None;
                b.half_open_trials = 1;
                b.half_open_epoch = b.half_open_epoch.wrapping_add(1);
                let epoch = b.half_open_epoch;
                drop(b);
                transitioned(route, BreakerState::HalfOpen);
                Admission::Trial(epoch)
            }
            BreakerState::HalfOpen => match self.config.half_open_max_trials {
                Some(max) if b.half_open_trials >= max => Admission::Rejected,
                _ => {
                    b.half_open_trials = b.half_open_trials.saturating_add(1);
                    Admission::Trial(b.half_open_epoch)
                }
            },
        }
    }

    fn release_trial(&self, route: &str, epoch: u64) {
        let breaker = self.breaker(route);
        let mut b = breaker.lock();
        if b.state == BreakerState::HalfOpen && b.half_open_epoch == epoch {
            b.half_open_trials = b.half_open_trials.saturating_sub(1);
            tracing::debug!(route, "half-open trial released without outcome");
        }
    }

    /// Records a completed request.
    pub fn record_success(&self, route: &str) {
        let breaker = self.breaker(route);
        let mut b = breaker.lock();

        let state = b.state;
        match state {
            BreakerState::Closed => b.failures = 0,
            BreakerState::HalfOpen => {
                b.state = BreakerState::Closed;
                b.failures = 0;
                b.half_open_trials = 0;
                drop(b);
                transitioned(route, BreakerState::Closed);
            }
            // A request admitted before the breaker opened.
            BreakerState::Open => {}
        }
    }

    /// Records a timeout or handler failure.
    pub fn record_failure(&self, route: &str) {
        let breaker = self.breaker(route);
        let mut b = breaker.lock();

        b.failures = b.failures.saturating_add(1);
        b.last_failure = Some(Utc::now());

        if b.state != BreakerState::Open && b.failures >= self.config.failure_threshold {
            b.state = BreakerState::Open;
            b.next_attempt = Some(Instant::now() + self.config.recovery_window);
            b.half_open_trials = 0;
            let failures = b.failures;
            drop(b);
            tracing::warn!(
                route,
                failures,
                recovery_window_secs = self.config.recovery_window.as_secs(),
                "Circuit breaker opened"
            );
            record_breaker_transition(route, BreakerState::Open.as_str());
        }
    }

    /// Returns the current state of a route's breaker.
    ///
    /// Does not perform the open to half-open transition.
    #[must_use]
    pub fn state(&self, route: &str) -> BreakerState {
        self.routes
            .get(route)
            .map_or(BreakerState::Closed, |b| b.lock().state)
    }

    /// Returns the consecutive failure count of a route.
    #[must_use]
    pub fn failures(&self, route: &str) -> u32 {
        self.routes.get(route).map_or(0, |b| b.lock().failures)
    }

    /// Returns a view of every known route, sorted by route.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BreakerSnapshot> {
        let now = Instant::now();
        let mut views: Vec<BreakerSnapshot> = self
            .routes
            .iter()
            .map(|entry| {
                let b = entry.value().lock();
                BreakerSnapshot {
                    route: entry.key().clone(),
                    state: b.state,
                    failures: b.failures,
                    last_failure: b.last_failure,
                    retry_in_ms: b.next_attempt.map(|at| {
                        u64::try_from(at.saturating_duration_since(now).as_millis())
                            .unwrap_or(u64::MAX)
                    }),
                }
            })
            .collect();
        views.sort_by(|a, b| a.route.cmp(&b.route));
        views
    }
}

fn transitioned(route: &str, to: BreakerState) {
    tracing::info!(route, to = %to, "Circuit breaker state changed");
    record_breaker_transition(route, to.as_str());
}
