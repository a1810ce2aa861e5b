//! Health-check results for critical routes.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Classification of a probed route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The probe returned a success status.
    Healthy,
    /// The probe returned an error status or failed outright.
    Unhealthy,
    /// The probe succeeded but exceeded the configured latency threshold.
    Degraded,
}

impl HealthStatus {
    /// Returns the lowercase label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Degraded => "degraded",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest probe outcome for one critical route.
///
/// Replaced wholesale on every probe cycle. `error_count` is the only value
/// carried over from the previous result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    /// Probed route path.
    pub route: String,
    /// Outcome of the latest probe.
    pub status: HealthStatus,
    /// When the latest probe finished.
    #[serde(serialize_with = "serialize_timestamp")]
    pub last_check: DateTime<Utc>,
    /// Response time of the latest probe. Zero when the probe failed outright.
    #[serde(rename = "responseTimeMs", serialize_with = "serialize_millis")]
    pub response_time: Duration,
    /// Number of failed probes since startup.
    pub error_count: u64,
}

impl HealthCheckResult {
    /// Builds the next result for a route from a fresh probe outcome.
    ///
    /// `previous` supplies the running error counter.
    #[must_use]
    pub fn next(
        previous: Option<&Self>,
        route: impl Into<String>,
        status: HealthStatus,
        response_time: Duration,
        last_check: DateTime<Utc>,
    ) -> Self {
        let prior_errors = previous.map_or(0, |p| p.error_count);
        let error_count = if status == HealthStatus::Unhealthy {
            prior_errors + 1
        } else {
            prior_errors
        };
        Self {
            route: route.into(),
            status,
            last_check,
            response_time,
            error_count,
        }
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
