//! # Agora Core
//!
//! Core types shared by every crate of the Agora request gateway.
//!
//! This crate provides the foundational types used throughout the gateway:
//!
//! - [`RequestId`] - UUID v7 request identifier
//! - [`CallerIdentity`] - Identity resolved upstream (user + roles, or anonymous)
//! - [`GatewayError`] / [`ErrorKind`] - Error taxonomy with fixed status mapping
//! - [`EndpointDefinition`] - Route + method with validation, auth, rate-limit and timeout policy
//! - [`EndpointRegistry`] - Exact-match lookup table, read-only after startup
//! - [`Schema`] - Structured request-body validator yielding field-path issues
//! - [`Handler`] - Downstream request handler contract

#![doc(html_root_url = "https://docs.rs/agora-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;
pub mod endpoint;
mod error;
pub mod handler;
mod identity;
pub mod registry;
pub mod schema;

pub use context::RequestId;
pub use endpoint::{EndpointDefinition, RateLimitPolicy, DEFAULT_TIMEOUT};
pub use error::{ErrorEnvelope, ErrorKind, GatewayError, GatewayResult, RegistryError};
pub use handler::{BoxFuture, Handler, HandlerError, HandlerFuture, Request, Response};
pub use identity::CallerIdentity;
pub use registry::{EndpointRegistry, Route};
pub use schema::{FieldIssue, FieldRule, FieldSpec, Schema, StringFormat};
