//! Downstream handler contract.
//!
//! A [`Handler`] is the business-logic collaborator the gateway fronts
//! (bookings, payments, listings, ...). The gateway only requires that a
//! handler either resolves with a response or fails; it never inspects the
//! body it returns.
//!
//! Each invocation receives a [`CancellationToken`]. The token is cancelled
//! when the endpoint timeout fires so handlers that spawn their own work can
//! stop it promptly. The handler future itself is dropped on timeout.
//!
//! # Example
//!
//! ```
//! use agora_core::handler::{json_response, Handler, HandlerError, Request};
//! use http::StatusCode;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn list_services(_req: Request, _cancel: CancellationToken)
//!     -> Result<agora_core::Response, HandlerError>
//! {
//!     json_response(StatusCode::OK, &serde_json::json!({ "services": [] }))
//! }
//!
//! fn assert_handler<H: Handler>(_h: H) {}
//! assert_handler(list_services);
//! ```

use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// The HTTP request type flowing through the gateway.
///
/// The body is fully buffered before the pipeline runs.
pub type Request = http::Request<Bytes>;

/// The HTTP response type flowing through the gateway.
pub type Response = http::Response<Bytes>;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Future returned by [`Handler::call`].
pub type HandlerFuture = BoxFuture<'static, Result<Response, HandlerError>>;

/// Error returned by a downstream handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The handler reported a failure.
    #[error("{0}")]
    Failed(String),

    /// The handler observed cancellation and stopped.
    #[error("handler cancelled")]
    Cancelled,

    /// The handler task panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),

    /// The handler failed with an underlying error.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Creates a failure with a message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

/// A request handler the gateway dispatches to.
///
/// Implemented automatically for async functions and closures of the form
/// `Fn(Request, CancellationToken) -> impl Future<Output = Result<Response, HandlerError>>`.
pub trait Handler: Send + Sync + 'static {
    /// Invokes the handler.
    fn call(&self, request: Request, cancel: CancellationToken) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Request, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
{
    fn call(&self, request: Request, cancel: CancellationToken) -> HandlerFuture {
        Box::pin(self(request, cancel))
    }
}

/// Builds a JSON response from a serializable value.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response, HandlerError> {
    let body = serde_json::to_vec(value)?;
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Ok(response)
}
