//! Endpoint registry.
//!
//! The registry is built once at startup and is read-only afterwards, so it
//! needs no locking. Lookup is an exact match on `(path, method)`; a miss is
//! returned as `None` and turned into a 404 by the gateway.

use http::Method;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::endpoint::EndpointDefinition;
use crate::error::RegistryError;
use crate::handler::Handler;

/// A registered endpoint together with the handler that serves it.
pub struct Route {
    definition: EndpointDefinition,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Returns the endpoint definition.
    #[must_use]
    pub fn definition(&self) -> &EndpointDefinition {
        &self.definition
    }

    /// Returns a shared handle to the handler.
    #[must_use]
    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Exact-match table of endpoints keyed by path, then method.
///
/// # Example
///
/// ```
/// use agora_core::{EndpointDefinition, EndpointRegistry, HandlerError, Request, Response};
/// use http::Method;
/// use tokio_util::sync::CancellationToken;
///
/// async fn ok(_req: Request, _cancel: CancellationToken) -> Result<Response, HandlerError> {
///     Ok(Response::new(Default::default()))
/// }
///
/// let mut registry = EndpointRegistry::new();
/// registry
///     .register(EndpointDefinition::new(Method::GET, "/api/services"), ok)
///     .unwrap();
///
/// assert!(registry.lookup("/api/services", &Method::GET).is_some());
/// assert!(registry.lookup("/api/services", &Method::POST).is_none());
/// assert!(registry.lookup("/api/services/1", &Method::GET).is_none());
/// ```
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    routes: HashMap<String, HashMap<Method, Arc<Route>>>,
    len: usize,
}

impl EndpointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint and its handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the path is not absolute, the timeout is
    /// zero, or the `(path, method)` pair is already registered.
    pub fn register<H: Handler>(
        &mut self,
        definition: EndpointDefinition,
        handler: H,
    ) -> Result<(), RegistryError> {
        self.register_arc(definition, Arc::new(handler))
    }

    /// Registers an endpoint with an already shared handler.
    ///
    /// # Errors
    ///
    /// See [`register`](Self::register).
    pub fn register_arc(
        &mut self,
        definition: EndpointDefinition,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        let path = definition.path().to_string();
        let method = definition.method().clone();

        if !path.starts_with('/') {
            return Err(RegistryError::InvalidPath(path));
        }
        if definition.timeout().is_some_and(|t| t.is_zero()) {
            return Err(RegistryError::ZeroTimeout {
                method: method.to_string(),
                path,
            });
        }

        let by_method = self.routes.entry(path.clone()).or_default();
        if by_method.contains_key(&method) {
            return Err(RegistryError::Duplicate {
                method: method.to_string(),
                path,
            });
        }

        tracing::debug!(method = %method, path = %path, "Registered endpoint");
        by_method.insert(method, Arc::new(Route { definition, handler }));
        self.len += 1;
        Ok(())
    }

    /// Looks up the route registered for `path` and `method`.
    #[must_use]
    pub fn lookup(&self, path: &str, method: &Method) -> Option<Arc<Route>> {
        self.routes.get(path)?.get(method).cloned()
    }

    /// Returns `true` if any method is registered for `path`.
    #[must_use]
    pub fn contains_path(&self, path: &str) -> bool {
        self.routes.contains_key(path)
    }

    /// Iterates over every registered endpoint definition.
    pub fn definitions(&self) -> impl Iterator<Item = &EndpointDefinition> {
        self.routes
            .values()
            .flat_map(HashMap::values)
            .map(|route| route.definition())
    }

    /// Returns the number of registered endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
