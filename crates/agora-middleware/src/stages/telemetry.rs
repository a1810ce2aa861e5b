//! Request telemetry stage.
//!
//! Outermost stage. Whatever happens further down the pipeline (not found,
//! rejected, timed out, handler success), this stage appends exactly one
//! [`RequestMetric`] to the [`MetricsRecorder`] and stamps the gateway
//! headers on the response.
//!
//! A request abandoned before the pipeline finishes (the caller went away and
//! the future was dropped) is recorded as [`CLIENT_CLOSED_STATUS`].
//!
//! # Headers
//!
//! - `X-Gateway-Request-ID`
//! - `X-Trace-ID` / `X-Span-ID`
//! - `X-Gateway-Response-Time` (e.g. `12ms`)
//! - `X-Gateway-Version`

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{headers, Request, Response};
use agora_core::GatewayError;
use agora_telemetry::{MetricsRecorder, RequestMetric};
use chrono::Utc;
use http::header::HeaderName;
use http::HeaderValue;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

/// Status recorded for a request whose caller went away mid-flight.
pub const CLIENT_CLOSED_STATUS: u16 = 499;

const CLIENT_CLOSED_MESSAGE: &str = "client closed request";

/// Records one metric per request and attaches gateway headers.
#[derive(Debug, Clone)]
pub struct TelemetryMiddleware {
    recorder: Arc<MetricsRecorder>,
    version: String,
}

impl TelemetryMiddleware {
    /// Creates the stage, reporting `version` in `X-Gateway-Version`.
    #[must_use]
    pub fn new(recorder: Arc<MetricsRecorder>, version: impl Into<String>) -> Self {
        Self {
            recorder,
            version: version.into(),
        }
    }

    fn stamp(&self, ctx: &MiddlewareContext, response: &mut Response) {
        let elapsed = format!("{}ms", ctx.elapsed().as_millis());
        let values = [
            (headers::GATEWAY_REQUEST_ID, Some(ctx.request_id().to_string())),
            (headers::TRACE_ID, ctx.trace_id().map(ToString::to_string)),
            (headers::SPAN_ID, ctx.span_id().map(ToString::to_string)),
            (headers::GATEWAY_RESPONSE_TIME, Some(elapsed)),
            (headers::GATEWAY_VERSION, Some(self.version.clone())),
        ];

        for (name, value) in values {
            let Some(value) = value else { continue };
            if let Ok(value) = HeaderValue::from_str(&value) {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(name), value);
            }
        }
    }
}

impl Middleware for TelemetryMiddleware {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = request.method().to_string();
            let path = request.uri().path().to_string();

            let mut pending = PendingMetric {
                recorder: &self.recorder,
                metric: Some(RequestMetric {
                    request_id: ctx.request_id(),
                    method: method.clone(),
                    path: path.clone(),
                    status: CLIENT_CLOSED_STATUS,
                    started_at: ctx.received_at(),
                    ended_at: ctx.received_at(),
                    response_time: ctx.elapsed(),
                    client_ip: ctx.client_ip(),
                    user_id: None,
                    error: Some(CLIENT_CLOSED_MESSAGE.to_string()),
                }),
                started: ctx.started_at(),
            };

            let mut response = next.run(ctx, request).await;
            pending.metric = None;

            let response_time = ctx.elapsed();
            let status = response.status().as_u16();
            let error = response
                .extensions()
                .get::<GatewayError>()
                .map(ToString::to_string);

            tracing::info!(
                request_id = %ctx.request_id(),
                trace_id = ctx.trace_id().unwrap_or_default(),
                caller = %ctx.identity().log_id(),
                method = %method,
                path = %path,
                status,
                duration_ms = response_time.as_millis() as u64,
                "request completed"
            );

            self.recorder.record(RequestMetric {
                request_id: ctx.request_id(),
                method,
                path,
                status,
                started_at: ctx.received_at(),
                ended_at: Utc::now(),
                response_time,
                client_ip: ctx.client_ip(),
                user_id: ctx.identity().user_id().map(ToString::to_string),
                error,
            });

            self.stamp(ctx, &mut response);
            response
        })
    }
}

/// Metric for an in-flight request, recorded on drop unless disarmed.
struct PendingMetric<'a> {
    recorder: &'a MetricsRecorder,
    metric: Option<RequestMetric>,
    started: Instant,
}

impl Drop for PendingMetric<'_> {
    fn drop(&mut self) {
        let Some(mut metric) = self.metric.take() else {
            return;
        };
        metric.response_time = self.started.elapsed();
        metric.ended_at = Utc::now();
        log_abandoned(&metric.method, &metric.path, metric.client_ip);
        self.recorder.record(metric);
    }
}

fn log_abandoned(method: &str, path: &str, client_ip: Option<IpAddr>) {
    tracing::info!(
        method,
        path,
        client_ip = ?client_ip,
        status = CLIENT_CLOSED_STATUS,
        "request abandoned by client"
    );
}
