//! End-to-end gateway scenarios.
//!
//! Each test builds a full [`Gateway`] the way an application would and
//! drives it only through [`Gateway::handle`] and the read APIs.

use agora::config::ConfigLoader;
use agora::middleware::BreakerState;
use agora::prelude::*;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const CALLER: IpAddr = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 20));

async fn ok(_req: Request, _cancel: CancellationToken) -> Result<Response, HandlerError> {
    Ok(Response::new(Bytes::from_static(b"{\"ok\":true}")))
}

async fn slow(_req: Request, _cancel: CancellationToken) -> Result<Response, HandlerError> {
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(Response::new(Bytes::new()))
}

fn post_json(path: &str, body: &'static str) -> Request {
    http::Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .body(Bytes::from_static(body.as_bytes()))
        .unwrap()
}

fn get(path: &str) -> Request {
    http::Request::builder().uri(path).body(Bytes::new()).unwrap()
}

fn error_message(response: &Response) -> String {
    let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    body["error"].as_str().unwrap().to_string()
}

fn booking_endpoint() -> EndpointDefinition {
    EndpointDefinition::new(Method::POST, "/api/bookings").with_schema(
        Schema::new()
            .field("serviceId", FieldRule::string().format(StringFormat::Uuid))
            .field("budget", FieldRule::number().min(0)),
    )
}

#[tokio::test]
async fn test_signin_rate_limit_from_config() {
    let config = ConfigLoader::new()
        .with_string(
            r#"
            [rate_limit]
            enforce = true

            [[endpoints]]
            path = "/api/auth/signin"
            method = "POST"
            rate_limit = { window_secs = 900, max_requests = 5 }
            "#,
            "toml",
        )
        .unwrap()
        .load()
        .unwrap();

    let gateway = Gateway::builder()
        .config(config)
        .handler(Method::POST, "/api/auth/signin", ok)
        .build()
        .unwrap();

    for _ in 0..5 {
        let response = gateway
            .handle(post_json("/api/auth/signin", "{}"), Some(CALLER))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let limited = gateway
        .handle(post_json("/api/auth/signin", "{}"), Some(CALLER))
        .await;
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(limited.headers().contains_key("retry-after"));

    // Another caller has its own window.
    let other = gateway
        .handle(
            post_json("/api/auth/signin", "{}"),
            Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 21))),
        )
        .await;
    assert_eq!(other.status(), StatusCode::OK);

    assert_eq!(gateway.state().breakers.failures("/api/auth/signin"), 0);
    assert_eq!(gateway.metrics().total_requests, 7);
}

#[tokio::test]
async fn test_signin_without_enforcement_is_not_limited() {
    let config = ConfigLoader::new()
        .with_string(
            r#"
            [[endpoints]]
            path = "/api/auth/signin"
            method = "POST"
            rate_limit = { window_secs = 900, max_requests = 5 }
            "#,
            "toml",
        )
        .unwrap()
        .load()
        .unwrap();

    let gateway = Gateway::builder()
        .config(config)
        .handler(Method::POST, "/api/auth/signin", ok)
        .build()
        .unwrap();

    for _ in 0..6 {
        let response = gateway
            .handle(post_json("/api/auth/signin", "{}"), Some(CALLER))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_booking_validation_names_every_field() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let gateway = Gateway::builder()
        .endpoint(booking_endpoint(), move |_req: Request, _cancel: CancellationToken| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, HandlerError>(Response::new(Bytes::new())) }
        })
        .build()
        .unwrap();

    let response = gateway
        .handle(
            post_json("/api/bookings", r#"{ "serviceId": "not-a-uuid", "budget": -5 }"#),
            Some(CALLER),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(&response);
    assert!(message.contains("serviceId"), "{message}");
    assert!(message.contains("budget"), "{message}");
    assert!(response.headers().contains_key("x-gateway-request-id"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(gateway.state().breakers.failures("/api/bookings"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_handler_times_out_and_counts_failure() {
    let gateway = Gateway::builder()
        .endpoint(
            EndpointDefinition::new(Method::GET, "/api/search")
                .with_timeout(Duration::from_millis(100)),
            slow,
        )
        .build()
        .unwrap();

    let response = gateway.handle(get("/api/search"), Some(CALLER)).await;

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(gateway.state().breakers.failures("/api/search"), 1);
    assert_eq!(gateway.metrics().total_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_opens_then_recovers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let gateway = Gateway::builder()
        .endpoint(
            EndpointDefinition::new(Method::GET, "/api/payments/status"),
            move |_req: Request, _cancel: CancellationToken| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 5 {
                        Err(HandlerError::failed("processor offline"))
                    } else {
                        Ok(Response::new(Bytes::new()))
                    }
                }
            },
        )
        .build()
        .unwrap();
    let breakers = &gateway.state().breakers;

    for _ in 0..5 {
        let response = gateway.handle(get("/api/payments/status"), Some(CALLER)).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
    assert_eq!(breakers.state("/api/payments/status"), BreakerState::Open);

    let rejected = gateway.handle(get("/api/payments/status"), Some(CALLER)).await;
    assert_eq!(rejected.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(breakers.failures("/api/payments/status"), 5);

    tokio::time::advance(Duration::from_secs(61)).await;

    let admitted = gateway.handle(get("/api/payments/status"), Some(CALLER)).await;
    assert_eq!(admitted.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(breakers.state("/api/payments/status"), BreakerState::Closed);
    assert_eq!(breakers.failures("/api/payments/status"), 0);

    let snapshot = gateway.breakers();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].state, BreakerState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_half_open_trial_recovers() {
    let config = ConfigLoader::new()
        .with_string("[breaker]\nhalf_open_max_trials = 1\n", "toml")
        .unwrap()
        .load()
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let gateway = Gateway::builder()
        .config(config)
        .endpoint(
            EndpointDefinition::new(Method::GET, "/api/payments/status"),
            move |_req: Request, _cancel: CancellationToken| {
                let call = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    match call {
                        0..=4 => Err(HandlerError::failed("processor offline")),
                        5 => {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                            Ok(Response::new(Bytes::new()))
                        }
                        _ => Ok(Response::new(Bytes::new())),
                    }
                }
            },
        )
        .build()
        .unwrap();
    let breakers = &gateway.state().breakers;

    for _ in 0..5 {
        gateway.handle(get("/api/payments/status"), Some(CALLER)).await;
    }
    tokio::time::advance(Duration::from_secs(61)).await;

    // The caller gives up on the half-open trial.
    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        gateway.handle(get("/api/payments/status"), Some(CALLER)),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(breakers.state("/api/payments/status"), BreakerState::HalfOpen);

    let retried = gateway.handle(get("/api/payments/status"), Some(CALLER)).await;
    assert_eq!(retried.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 7);
    assert_eq!(breakers.state("/api/payments/status"), BreakerState::Closed);

    let entries = gateway.state().recorder.entries();
    assert_eq!(gateway.metrics().total_requests, 7);
    assert_eq!(entries.iter().filter(|e| e.status == 499).count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_metrics_after_mixed_outcomes() {
    let gateway = Gateway::builder()
        .handler(Method::GET, "/api/services", ok)
        .endpoint(booking_endpoint(), ok)
        .endpoint(
            EndpointDefinition::new(Method::GET, "/api/search")
                .with_timeout(Duration::from_millis(100)),
            slow,
        )
        .build()
        .unwrap();

    let success = gateway.handle(get("/api/services"), Some(CALLER)).await;
    let invalid = gateway
        .handle(post_json("/api/bookings", r#"{"budget":1}"#), Some(CALLER))
        .await;
    let timed_out = gateway.handle(get("/api/search"), Some(CALLER)).await;

    assert_eq!(success.status(), StatusCode::OK);
    assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
    assert_eq!(timed_out.status(), StatusCode::REQUEST_TIMEOUT);

    let metrics = gateway.metrics();
    assert_eq!(metrics.total_requests, 3);
    assert!((metrics.error_rate - 2.0 / 3.0).abs() < 1e-3);
    assert_eq!(metrics.requests_in_last_minute, 3);
    assert_eq!(metrics.top_routes_by_volume.len(), 3);
}
