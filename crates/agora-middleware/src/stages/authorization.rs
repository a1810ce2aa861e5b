//! Authorization stage.
//!
//! Compares the caller identity resolved upstream against the matched
//! endpoint's declared policy:
//!
//! - `requires_auth` and an anonymous caller: `401`
//! - `allowed_roles` set and the caller holds none of them: `403`
//!
//! Authorization failures are caller mistakes and never reach the circuit
//! breaker.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use agora_core::{CallerIdentity, EndpointDefinition, GatewayError};

/// Middleware that enforces endpoint auth requirements.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorizationMiddleware;

impl AuthorizationMiddleware {
    /// Creates the stage.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Checks `identity` against the endpoint's auth policy.
///
/// # Errors
///
/// Returns [`GatewayError::Unauthenticated`] or [`GatewayError::Forbidden`].
pub fn authorize(
    identity: &CallerIdentity,
    endpoint: &EndpointDefinition,
) -> Result<(), GatewayError> {
    if !endpoint.requires_auth() {
        return Ok(());
    }
    if identity.is_anonymous() {
        return Err(GatewayError::Unauthenticated);
    }
    match endpoint.allowed_roles() {
        Some(allowed) if !identity.has_any_role(allowed) => Err(GatewayError::Forbidden {
            allowed_roles: allowed.to_vec(),
        }),
        _ => Ok(()),
    }
}

impl Middleware for AuthorizationMiddleware {
    fn name(&self) -> &'static str {
        "authorization"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let decision = match ctx.route() {
                Some(route) => authorize(ctx.identity(), route.definition()),
                None => Ok(()),
            };

            match decision {
                Ok(()) => next.run(ctx, request).await,
                Err(err) => {
                    tracing::debug!(
                        caller = %ctx.identity().log_id(),
                        error = %err,
                        "authorization denied"
                    );
                    ctx.reject(err)
                }
            }
        })
    }
}
