//! Common types used throughout the middleware pipeline.

pub use agora_core::{Request, Response};

/// Header names read or written by the gateway.
pub mod headers {
    /// Request id assigned by the gateway.
    pub const GATEWAY_REQUEST_ID: &str = "x-gateway-request-id";
    /// Trace id, reused from the caller when supplied.
    pub const TRACE_ID: &str = "x-trace-id";
    /// Span id generated for this hop.
    pub const SPAN_ID: &str = "x-span-id";
    /// Total time spent in the gateway, e.g. `12ms`.
    pub const GATEWAY_RESPONSE_TIME: &str = "x-gateway-response-time";
    /// Gateway version.
    pub const GATEWAY_VERSION: &str = "x-gateway-version";
    /// Upstream-assigned request id, honoured only when trusted.
    pub const REQUEST_ID: &str = "x-request-id";
    /// W3C trace context.
    pub const TRACEPARENT: &str = "traceparent";
    /// Upstream-resolved user id.
    pub const USER_ID: &str = "x-user-id";
    /// Upstream-resolved roles, comma separated.
    pub const USER_ROLES: &str = "x-user-roles";
    /// First hop address set by proxies.
    pub const FORWARDED_FOR: &str = "x-forwarded-for";
}
