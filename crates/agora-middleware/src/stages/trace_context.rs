//! Trace context stage.
//!
//! Resolves the trace id for the request and opens a `tracing` span that
//! covers the rest of the pipeline.
//!
//! ## Trace ID sources, in order
//!
//! 1. `X-Trace-ID` header, reused verbatim
//! 2. W3C `traceparent` header (`00-{trace-id}-{parent-span-id}-{flags}`)
//! 3. A freshly generated 128-bit id
//!
//! A new 64-bit span id is generated for every request. When the trace came
//! from `traceparent`, the upstream span is kept as [`ParentSpan`] in the
//! context.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{headers, Request, Response};
use tracing::Instrument;
use uuid::Uuid;

const MAX_TRACE_ID_LEN: usize = 128;

/// Middleware that resolves trace and span ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceContextMiddleware;

impl TraceContextMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn resolve(request: &Request) -> (String, Option<ParentSpan>) {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        if let Some(trace_id) = header(headers::TRACE_ID).filter(|v| v.len() <= MAX_TRACE_ID_LEN) {
            return (trace_id.to_string(), None);
        }

        if let Some(parent) = header(headers::TRACEPARENT).and_then(TraceContext::parse) {
            return (parent.trace_id, Some(ParentSpan(parent.parent_span_id)));
        }

        (generate_trace_id(), None)
    }
}

/// Generates a 32 hex character trace id.
fn generate_trace_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Generates a 16 hex character span id.
fn generate_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

impl Middleware for TraceContextMiddleware {
    fn name(&self) -> &'static str {
        "trace_context"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let (trace_id, parent) = Self::resolve(&request);
        let span_id = generate_span_id();

        let span = tracing::info_span!(
            "gateway.request",
            request_id = %ctx.request_id(),
            trace_id = %trace_id,
            span_id = %span_id,
            method = %request.method(),
            path = %request.uri().path(),
        );

        ctx.set_trace_id(trace_id);
        ctx.set_span_id(span_id);
        if let Some(parent) = parent {
            ctx.set_extension(parent);
        }

        Box::pin(next.run(ctx, request).instrument(span))
    }
}

/// Upstream span id taken from `traceparent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentSpan(pub String);

/// Parsed W3C `traceparent` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// The 128-bit trace id as hex.
    pub trace_id: String,
    /// The upstream span id as hex.
    pub parent_span_id: String,
    /// Whether the upstream sampled the trace.
    pub sampled: bool,
}

impl TraceContext {
    /// Parses a `traceparent` header value.
    ///
    /// Only version `00` is accepted. All-zero trace or span ids are invalid.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.split('-');
        let (version, trace_id, span_id, flags) =
            (parts.next()?, parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || version != "00" {
            return None;
        }

        let is_hex =
            |s: &str, len: usize| s.len() == len && s.chars().all(|c| c.is_ascii_hexdigit());
        if !is_hex(trace_id, 32) || !is_hex(span_id, 16) || !is_hex(flags, 2) {
            return None;
        }
        if trace_id.chars().all(|c| c == '0') || span_id.chars().all(|c| c == '0') {
            return None;
        }

        let flags = u8::from_str_radix(flags, 16).ok()?;
        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_span_id: span_id.to_ascii_lowercase(),
            sampled: flags & 0x01 != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn request(header: Option<(&str, &str)>) -> Request {
        let mut builder = http::Request::builder().method("GET").uri("/api/services");
        if let Some((name, value)) = header {
            builder = builder.header(name, value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    fn ok<'a>() -> Next<'a> {
        Next::terminal(|_ctx, _req| Box::pin(async { Response::new(Bytes::new()) }))
    }

    #[tokio::test]
    async fn test_generates_trace_context_when_missing() {
        let mut ctx = MiddlewareContext::new();
        TraceContextMiddleware::new()
            .process(&mut ctx, request(None), ok())
            .await;

        let trace_id = ctx.trace_id().unwrap();
        let span_id = ctx.span_id().unwrap();
        assert_eq!(trace_id.len(), 32);
        assert_eq!(span_id.len(), 16);
        assert!(trace_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(ctx.get_extension::<ParentSpan>().is_none());
    }

    #[tokio::test]
    async fn test_reuses_inbound_trace_id_header() {
        let mut ctx = MiddlewareContext::new();
        TraceContextMiddleware::new()
            .process(&mut ctx, request(Some((headers::TRACE_ID, "checkout-7781"))), ok())
            .await;

        assert_eq!(ctx.trace_id(), Some("checkout-7781"));
    }

    #[tokio::test]
    async fn test_propagates_traceparent() {
        let mut ctx = MiddlewareContext::new();
        let traceparent = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";
        TraceContextMiddleware::new()
            .process(&mut ctx, request(Some((headers::TRACEPARENT, traceparent))), ok())
            .await;

        assert_eq!(ctx.trace_id(), Some("0af7651916cd43dd8448eb211c80319c"));
        assert_ne!(ctx.span_id(), Some("b7ad6b7169203331"));
        assert_eq!(
            ctx.get_extension::<ParentSpan>(),
            Some(&ParentSpan("b7ad6b7169203331".to_string()))
        );
    }

    #[tokio::test]
    async fn test_span_ids_differ_per_request() {
        let mut first = MiddlewareContext::new();
        let mut second = MiddlewareContext::new();
        let stage = TraceContextMiddleware::new();
        stage.process(&mut first, request(None), ok()).await;
        stage.process(&mut second, request(None), ok()).await;

        assert_ne!(first.span_id(), second.span_id());
        assert_ne!(first.trace_id(), second.trace_id());
    }

    #[test]
    fn test_parse_traceparent() {
        let context =
            TraceContext::parse("00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01").unwrap();

        assert_eq!(context.trace_id, "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(context.parent_span_id, "b7ad6b7169203331");
        assert!(context.sampled);
    }

    #[test]
    fn test_parse_traceparent_rejects_invalid() {
        let invalid = [
            "01-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            "00-00000000000000000000000000000000-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01-xx",
        ];
        for header in invalid {
            assert!(TraceContext::parse(header).is_none(), "{header}");
        }
        assert!(TraceContext::parse("00-abc-def-01").is_none());
        assert!(TraceContext::parse("").is_none());
    }
}
