//! Built-in operational endpoints.
//!
//! | Route                    | Body                                  |
//! |--------------------------|---------------------------------------|
//! | `GET /_gateway/metrics`    | [`MetricsSnapshot`] as JSON           |
//! | `GET /_gateway/health`     | overall status plus per-route results |
//! | `GET /_gateway/breakers`   | every route's breaker snapshot        |
//! | `GET /_gateway/prometheus` | Prometheus text exposition            |
//!
//! These are answered by the server before the gateway pipeline runs, so
//! they never appear in the request log or touch a breaker.
//!
//! [`MetricsSnapshot`]: agora::telemetry::MetricsSnapshot

use agora::core::handler::json_response;
use agora::telemetry::{HealthCheckResult, HealthStatus};
use agora::{Gateway, Response};
use bytes::Bytes;
use http::{header, HeaderValue, Method, StatusCode};
use serde::Serialize;

/// Path prefix reserved for operational endpoints.
pub const OPS_PREFIX: &str = "/_gateway/";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, Serialize)]
struct HealthSummary {
    status: HealthStatus,
    checks: Vec<HealthCheckResult>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    error: &'a str,
}

/// Answers `method path` if it names an operational endpoint.
///
/// Returns `None` for every other path, including unknown paths under
/// [`OPS_PREFIX`], which then go through the gateway and 404 there.
#[must_use]
pub fn respond(gateway: &Gateway, method: &Method, path: &str) -> Option<Response> {
    let name = path.strip_prefix(OPS_PREFIX)?;
    if !matches!(name, "metrics" | "health" | "breakers" | "prometheus") {
        return None;
    }
    if method != Method::GET {
        return Some(json(
            StatusCode::METHOD_NOT_ALLOWED,
            &Message {
                error: "method not allowed",
            },
        ));
    }

    let response = match name {
        "metrics" => json(StatusCode::OK, &gateway.metrics()),
        "health" => health(gateway.health_checks()),
        "breakers" => json(StatusCode::OK, &gateway.breakers()),
        _ => prometheus(gateway.render_prometheus()),
    };
    Some(response)
}

/// Worst status across `checks`. No checks yet counts as healthy.
#[must_use]
pub fn overall_status(checks: &[HealthCheckResult]) -> HealthStatus {
    checks.iter().fold(HealthStatus::Healthy, |worst, check| {
        match (worst, check.status) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        }
    })
}

fn health(checks: Vec<HealthCheckResult>) -> Response {
    let status = overall_status(&checks);
    let code = if status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    json(code, &HealthSummary { status, checks })
}

fn prometheus(rendered: Option<String>) -> Response {
    let Some(text) = rendered else {
        return json(
            StatusCode::NOT_FOUND,
            &Message {
                error: "prometheus exporter disabled",
            },
        );
    };
    let mut response = Response::new(Bytes::from(text));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
    );
    response
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
    json_response(status, value).unwrap_or_else(|err| {
        tracing::error!(error = %err, "failed to serialize operational response");
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora::{HandlerError, Request};
    use chrono::Utc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn check(route: &str, status: HealthStatus) -> HealthCheckResult {
        HealthCheckResult::next(None, route, status, Duration::from_millis(4), Utc::now())
    }

    fn gateway() -> Gateway {
        Gateway::builder()
            .handler(Method::GET, "/api/health", |_req: Request, _cancel: CancellationToken| async {
                Ok::<_, HandlerError>(Response::new(Bytes::from_static(b"ok")))
            })
            .build()
            .unwrap()
    }

    fn body(response: &Response) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_overall_status_is_worst() {
        assert_eq!(overall_status(&[]), HealthStatus::Healthy);
        assert_eq!(
            overall_status(&[
                check("/a", HealthStatus::Healthy),
                check("/b", HealthStatus::Degraded)
            ]),
            HealthStatus::Degraded
        );
        assert_eq!(
            overall_status(&[
                check("/a", HealthStatus::Unhealthy),
                check("/b", HealthStatus::Degraded)
            ]),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn test_non_ops_paths_pass_through() {
        let gateway = gateway();
        assert!(respond(&gateway, &Method::GET, "/api/health").is_none());
        assert!(respond(&gateway, &Method::GET, "/_gateway/unknown").is_none());
    }

    #[test]
    fn test_ops_paths_are_get_only() {
        let gateway = gateway();
        let response = respond(&gateway, &Method::POST, "/_gateway/metrics").unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_uses_camel_case() {
        let gateway = gateway();
        let response = respond(&gateway, &Method::GET, "/_gateway/metrics").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let value = body(&response);
        assert_eq!(value["totalRequests"], 0);
        assert!(value["topRoutesByVolume"].is_array());
    }

    #[tokio::test]
    async fn test_health_endpoint_reflects_probes() {
        let gateway = gateway();
        let empty = respond(&gateway, &Method::GET, "/_gateway/health").unwrap();
        assert_eq!(empty.status(), StatusCode::OK);

        gateway.probe_health().await;
        let response = respond(&gateway, &Method::GET, "/_gateway/health").unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let value = body(&response);
        assert_eq!(value["status"], "healthy");
        assert_eq!(value["checks"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_endpoint_unhealthy_is_503() {
        let gateway = Gateway::builder().build().unwrap();
        gateway.probe_health().await;

        let response = respond(&gateway, &Method::GET, "/_gateway/health").unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body(&response)["status"], "unhealthy");
    }

    #[test]
    fn test_breakers_endpoint_lists_routes() {
        let gateway = gateway();
        let response = respond(&gateway, &Method::GET, "/_gateway/breakers").unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body(&response).is_array());
    }
}
