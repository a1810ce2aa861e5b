//! Rolling request log and health board.
//!
//! [`MetricsRecorder`] keeps one [`RequestMetric`] per processed request in a
//! bounded in-memory log. The log is trimmed by count on every append and by
//! age on [`sweep`](MetricsRecorder::sweep), so it never exceeds either bound
//! for longer than one sweep interval. It also holds the latest
//! [`HealthCheckResult`] per critical route.
//!
//! [`MetricsRecorder::snapshot`] aggregates the current contents into a
//! [`MetricsSnapshot`] for dashboards. Aggregation has no side effects and
//! reflects only retained entries, not lifetime totals.

use agora_core::RequestId;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::net::IpAddr;
use std::time::Duration;

use crate::health::HealthCheckResult;
use crate::metrics::record_request;

/// Retention and reporting limits for the request log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecorderConfig {
    /// Maximum number of retained entries.
    pub max_entries: usize,
    /// Maximum age of a retained entry, enforced by [`MetricsRecorder::sweep`].
    pub retention: Duration,
    /// Number of routes reported in `topRoutesByVolume`.
    pub top_routes: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            retention: Duration::from_secs(60 * 60),
            top_routes: 10,
        }
    }
}

/// One observation of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetric {
    /// Request id.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Final status code.
    pub status: u16,
    /// When the gateway received the request.
    pub started_at: DateTime<Utc>,
    /// When the gateway produced the response.
    pub ended_at: DateTime<Utc>,
    /// Measured response time.
    pub response_time: Duration,
    /// Caller IP, when known.
    pub client_ip: Option<IpAddr>,
    /// Caller user id, when resolved.
    pub user_id: Option<String>,
    /// Error message for failed requests.
    pub error: Option<String>,
}

impl RequestMetric {
    /// Returns `true` for 4xx and 5xx outcomes.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.status >= 400
    }
}

/// Request volume for a single route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteVolume {
    /// Route path.
    pub route: String,
    /// Number of retained entries for the route.
    pub count: usize,
}

/// Aggregated view of the request log and health board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Number of retained entries.
    pub total_requests: usize,
    /// Mean response time in milliseconds.
    pub average_response_time: f64,
    /// Fraction of retained entries with status >= 400.
    pub error_rate: f64,
    /// Entries completed within the last 60 seconds.
    pub requests_in_last_minute: usize,
    /// Busiest routes, most requests first.
    pub top_routes_by_volume: Vec<RouteVolume>,
    /// Latest health probe per critical route.
    pub health_checks: Vec<HealthCheckResult>,
}

/// Bounded request log plus per-route health results.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    config: RecorderConfig,
    log: Mutex<VecDeque<RequestMetric>>,
    health: Mutex<BTreeMap<String, HealthCheckResult>>,
}

impl MetricsRecorder {
    /// Creates a recorder with the given limits.
    #[must_use]
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            log: Mutex::new(VecDeque::with_capacity(config.max_entries.min(1024))),
            health: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Appends a metric, evicting the oldest entries beyond `max_entries`.
    pub fn record(&self, metric: RequestMetric) {
        record_request(
            &metric.path,
            &metric.method,
            metric.status,
            metric.response_time,
        );

        let mut log = self.log.lock();
        log.push_back(metric);
        while log.len() > self.config.max_entries {
            log.pop_front();
        }
    }

    /// Removes entries that completed before `now - retention`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = TimeDelta::from_std(self.config.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
        else {
            return 0;
        };

        let mut log = self.log.lock();
        let before = log.len();
        log.retain(|metric| metric.ended_at >= cutoff);
        let removed = before - log.len();
        drop(log);

        if removed > 0 {
            tracing::debug!(removed, "Swept expired request metrics");
        }
        removed
    }

    /// Returns the number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Returns `true` if no entries are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    /// Returns a copy of the retained entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> Vec<RequestMetric> {
        self.log.lock().iter().cloned().collect()
    }

    /// Replaces the health result for `result.route`.
    pub fn record_health(&self, result: HealthCheckResult) {
        self.health.lock().insert(result.route.clone(), result);
    }

    /// Replaces the health result for `route` with one derived from the
    /// current result, under the board lock.
    pub fn update_health<F>(&self, route: &str, next: F) -> HealthCheckResult
    where
        F: FnOnce(Option<&HealthCheckResult>) -> HealthCheckResult,
    {
        let mut board = self.health.lock();
        let result = next(board.get(route));
        board.insert(route.to_string(), result.clone());
        result
    }

    /// Returns the latest health result for a route.
    #[must_use]
    pub fn health_check(&self, route: &str) -> Option<HealthCheckResult> {
        self.health.lock().get(route).cloned()
    }

    /// Returns every health result, ordered by route.
    #[must_use]
    pub fn health_checks(&self) -> Vec<HealthCheckResult> {
        self.health.lock().values().cloned().collect()
    }

    /// Aggregates the current contents.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.snapshot_at(Utc::now())
    }

    /// Aggregates the current contents as seen at `now`.
    #[must_use]
    pub fn snapshot_at(&self, now: DateTime<Utc>) -> MetricsSnapshot {
        let minute_ago = now - TimeDelta::seconds(60);
        let log = self.log.lock();

        let total = log.len();
        let mut errors = 0usize;
        let mut last_minute = 0usize;
        let mut total_ms = 0f64;
        let mut volume: HashMap<&str, usize> = HashMap::new();

        for metric in log.iter() {
            total_ms += metric.response_time.as_secs_f64() * 1000.0;
            if metric.is_error() {
                errors += 1;
            }
            if metric.ended_at >= minute_ago {
                last_minute += 1;
            }
            *volume.entry(metric.path.as_str()).or_default() += 1;
        }

        let mut top_routes: Vec<RouteVolume> = volume
            .into_iter()
            .map(|(route, count)| RouteVolume {
                route: route.to_string(),
                count,
            })
            .collect();
        drop(log);

        top_routes.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.route.cmp(&b.route)));
        top_routes.truncate(self.config.top_routes);

        #[allow(clippy::cast_precision_loss)]
        let (average_response_time, error_rate) = if total == 0 {
            (0.0, 0.0)
        } else {
            (total_ms / total as f64, errors as f64 / total as f64)
        };

        MetricsSnapshot {
            total_requests: total,
            average_response_time,
            error_rate,
            requests_in_last_minute: last_minute,
            top_routes_by_volume: top_routes,
            health_checks: self.health_checks(),
        }
    }
}
