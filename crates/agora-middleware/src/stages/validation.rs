//! Request validation stage.
//!
//! Runs before the circuit breaker and before any handler, so a malformed
//! request never counts against a route's breaker.
//!
//! Rules, first failure wins:
//!
//! 0. A request marked [`UnreadableBody`] by the server is rejected with the
//!    error it carries.
//! 1. `POST`, `PUT` and `PATCH` must declare a JSON `Content-Type`.
//! 2. If the endpoint has a [`Schema`](agora_core::Schema) and the method
//!    carries a body, the body is parsed as JSON and checked against it.
//!    Failures read `field: reason`, joined by `, `.
//! 3. Everything else passes.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use agora_core::endpoint::carries_body;
use agora_core::{EndpointDefinition, FieldIssue, GatewayError};
use agora_telemetry::metrics::record_validation_failure;
use http::header;

/// Message returned when a body-carrying request is not JSON.
pub const CONTENT_TYPE_MESSAGE: &str = "Content-Type must be application/json";

/// Request extension set by the server when the body could not be read.
///
/// The request arrives with an empty body; validation rejects it with the
/// carried error so the failure still gets gateway headers and a metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableBody(pub GatewayError);

/// Validates `request` against `endpoint`.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] describing the first failed rule.
///
/// # Example
///
/// ```
/// use agora_core::{EndpointDefinition, FieldRule, Schema, StringFormat};
/// use agora_middleware::stages::validation::validate_request;
/// use bytes::Bytes;
/// use http::Method;
///
/// let endpoint = EndpointDefinition::new(Method::POST, "/api/newsletter")
///     .with_schema(Schema::new().field("email", FieldRule::string().format(StringFormat::Email)));
///
/// let request = http::Request::builder()
///     .method(Method::POST)
///     .uri("/api/newsletter")
///     .header("content-type", "application/json")
///     .body(Bytes::from_static(br#"{"email":"nope"}"#))
///     .unwrap();
///
/// let err = validate_request(&request, &endpoint).unwrap_err();
/// assert_eq!(err.to_string(), "email: invalid email format");
/// ```
pub fn validate_request(
    request: &Request,
    endpoint: &EndpointDefinition,
) -> Result<(), GatewayError> {
    if let Some(UnreadableBody(err)) = request.extensions().get::<UnreadableBody>() {
        return Err(err.clone());
    }

    if !carries_body(request.method()) {
        return Ok(());
    }

    if !is_json(request) {
        return Err(GatewayError::validation(CONTENT_TYPE_MESSAGE));
    }

    let Some(schema) = endpoint.schema() else {
        return Ok(());
    };

    let body = request.body();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(GatewayError::validation(FieldIssue::new("body", "required").to_string()));
    }

    let value: serde_json::Value = serde_json::from_slice(body).map_err(|_| {
        GatewayError::validation(FieldIssue::new("body", "malformed JSON").to_string())
    })?;

    schema
        .validate(&value)
        .map_err(|issues| GatewayError::validation(FieldIssue::join(&issues)))
}

fn is_json(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains("application/json"))
}

/// Middleware that validates the request against the matched endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for ValidationMiddleware {
    fn name(&self) -> &'static str {
        "validation"
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

            match validate_request(&request, route.definition()) {
                Ok(()) => next.run(ctx, request).await,
                Err(err) => {
                    let path = route.definition().path();
                    tracing::debug!(route = path, error = %err, "request validation failed");
                    record_validation_failure(path);
                    ctx.reject(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::{FieldRule, Schema, StringFormat};
    use bytes::Bytes;
    use http::Method;

    fn bookings() -> EndpointDefinition {
        EndpointDefinition::new(Method::POST, "/api/bookings").with_schema(
            Schema::new()
                .field("serviceId", FieldRule::string().format(StringFormat::Uuid))
                .field("budget", FieldRule::number().min(0)),
        )
    }

    fn request(method: Method, content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = http::Request::builder().method(method).uri("/api/bookings");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(Bytes::from_static(body.as_bytes())).unwrap()
    }

    #[test]
    fn test_missing_content_type_rejected() {
        let err = validate_request(&request(Method::POST, None, "{}"), &bookings()).unwrap_err();
        assert_eq!(err, GatewayError::validation(CONTENT_TYPE_MESSAGE));
    }

    #[test]
    fn test_content_type_with_charset_accepted() {
        let body = r#"{"serviceId":"0b9c5f5e-8a43-4f57-9a36-5d7b1a0c2e11","budget":120}"#;
        let req = request(Method::POST, Some("Application/JSON; charset=utf-8"), body);
        assert!(validate_request(&req, &bookings()).is_ok());
    }

    #[test]
    fn test_content_type_checked_without_schema() {
        let endpoint = EndpointDefinition::new(Method::PUT, "/api/bookings");
        let req = request(Method::PUT, Some("text/plain"), "hello");
        assert_eq!(
            validate_request(&req, &endpoint),
            Err(GatewayError::validation(CONTENT_TYPE_MESSAGE))
        );
    }

    #[test]
    fn test_get_is_never_checked() {
        let req = request(Method::GET, None, "not json");
        assert!(validate_request(&req, &bookings()).is_ok());
    }

    #[test]
    fn test_schema_issues_name_every_field() {
        let req = request(
            Method::POST,
            Some("application/json"),
            r#"{"serviceId":"not-a-uuid","budget":-5}"#,
        );
        let err = validate_request(&req, &bookings()).unwrap_err();

        assert_eq!(
            err.to_string(),
            "serviceId: invalid UUID format, budget: must be greater than or equal to 0"
        );
    }

    #[test]
    fn test_unreadable_body_is_rejected_with_its_error() {
        let timeout = GatewayError::Timeout {
            timeout: std::time::Duration::from_secs(5),
        };
        let mut req = request(Method::GET, None, "");
        req.extensions_mut().insert(UnreadableBody(timeout.clone()));

        assert_eq!(validate_request(&req, &bookings()), Err(timeout));
    }

    #[test]
    fn test_malformed_json() {
        let req = request(Method::POST, Some("application/json"), "{\"budget\":");
        let err = validate_request(&req, &bookings()).unwrap_err();
        assert_eq!(err.to_string(), "body: malformed JSON");
    }

    #[test]
    fn test_empty_body_with_schema() {
        let req = request(Method::PATCH, Some("application/json"), "  ");
        let err = validate_request(&req, &bookings()).unwrap_err();
        assert_eq!(err.to_string(), "body: required");
    }

    #[tokio::test]
    async fn test_middleware_rejects_before_next() {
        use agora_core::{EndpointRegistry, HandlerError};
        use tokio_util::sync::CancellationToken;

        let mut registry = EndpointRegistry::new();
        registry
            .register(bookings(), |_req: Request, _cancel: CancellationToken| async {
                Ok::<_, HandlerError>(Response::new(Bytes::new()))
            })
            .unwrap();
        let mut ctx = MiddlewareContext::new();
        ctx.set_route(registry.lookup("/api/bookings", &Method::POST).unwrap());

        let next = Next::terminal(|_ctx, _req| -> BoxFuture<'static, Response> {
            panic!("handler must not run for invalid requests")
        });
        let response = ValidationMiddleware::new()
            .process(&mut ctx, request(Method::POST, None, "{}"), next)
            .await;

        assert_eq!(response.status(), http::StatusCode::BAD_REQUEST);
    }
}
