//! Identity resolution stage.
//!
//! The gateway never authenticates callers. An upstream collaborator (auth
//! proxy, session layer) has already decided who the caller is; this stage
//! only reads that claim through an [`IdentityResolver`] and stores it in the
//! context for the authorization and rate-limit stages.
//!
//! The default [`HeaderIdentityResolver`] reads:
//!
//! - `X-User-ID` - the resolved user id
//! - `X-User-Roles` - comma-separated role names

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{headers, Request, Response};
use agora_core::CallerIdentity;
use std::fmt;
use std::sync::Arc;

/// Source of the upstream-resolved caller identity.
pub trait IdentityResolver: Send + Sync + 'static {
    /// Returns the caller identity for `request`, or anonymous.
    fn resolve(&self, request: &Request) -> CallerIdentity;
}

impl<T: IdentityResolver + ?Sized> IdentityResolver for Arc<T> {
    fn resolve(&self, request: &Request) -> CallerIdentity {
        (**self).resolve(request)
    }
}

/// Reads identity from the `X-User-ID` / `X-User-Roles` headers.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentityResolver;

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, request: &Request) -> CallerIdentity {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
        };

        let Some(user_id) = header(headers::USER_ID) else {
            return CallerIdentity::Anonymous;
        };

        let roles = header(headers::USER_ROLES)
            .map(|roles| {
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|role| !role.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        CallerIdentity::user(user_id, roles)
    }
}

/// Middleware that stores the caller identity in the context.
#[derive(Clone)]
pub struct IdentityMiddleware {
    resolver: Arc<dyn IdentityResolver>,
}

impl IdentityMiddleware {
    /// Creates the stage with the header resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resolver(HeaderIdentityResolver)
    }

    /// Creates the stage with a custom resolver.
    #[must_use]
    pub fn with_resolver(resolver: impl IdentityResolver) -> Self {
        Self {
            resolver: Arc::new(resolver),
        }
    }
}

impl Default for IdentityMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for IdentityMiddleware {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let identity = self.resolver.resolve(&request);
            tracing::debug!(caller = %identity.log_id(), "identity resolved");
            ctx.set_identity(identity);
            next.run(ctx, request).await
        })
    }
}
