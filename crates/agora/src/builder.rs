//! Gateway assembly.

use agora_config::GatewayConfig;
use agora_core::{EndpointDefinition, EndpointRegistry, Handler, RegistryError};
use agora_middleware::{
    BreakerConfig, CircuitBreakerManager, IdentityResolver, Pipeline, RateLimiter, TimeoutRouter,
};
use agora_telemetry::MetricsRecorder;
use http::Method;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BuildError, BuildResult};
use crate::gateway::Gateway;
use crate::health::HealthProber;
use crate::state::GatewayState;

/// Builder for [`Gateway`].
///
/// Endpoints come from two places:
///
/// - [`endpoint`](Self::endpoint) registers a definition built in code
/// - [`handler`](Self::handler) binds a handler by method and path. If the
///   configuration declares that endpoint, its policy is used; otherwise the
///   endpoint gets a default definition.
///
/// Every endpoint declared in configuration must have a handler bound.
///
/// # Example
///
/// ```
/// use agora::{Gateway, HandlerError, Request, Response};
/// use agora::config::GatewayConfig;
/// use bytes::Bytes;
/// use http::Method;
/// use tokio_util::sync::CancellationToken;
///
/// let gateway = Gateway::builder()
///     .config(GatewayConfig::default())
///     .handler(Method::GET, "/api/health", |_req: Request, _cancel: CancellationToken| async {
///         Ok::<_, HandlerError>(Response::new(Bytes::from_static(b"ok")))
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(gateway.state().registry.len(), 1);
/// ```
pub struct GatewayBuilder {
    config: GatewayConfig,
    endpoints: Vec<(EndpointDefinition, Arc<dyn Handler>)>,
    handlers: Vec<(Method, String, Arc<dyn Handler>)>,
    identity: Option<Arc<dyn IdentityResolver>>,
}

impl GatewayBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            endpoints: Vec::new(),
            handlers: Vec::new(),
            identity: None,
        }
    }

    /// Uses `config` for every component.
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers an endpoint defined in code.
    #[must_use]
    pub fn endpoint<H: Handler>(mut self, definition: EndpointDefinition, handler: H) -> Self {
        self.endpoints.push((definition, Arc::new(handler)));
        self
    }

    /// Binds a handler to `method path`.
    #[must_use]
    pub fn handler<H: Handler>(
        mut self,
        method: Method,
        path: impl Into<String>,
        handler: H,
    ) -> Self {
        self.handlers.push((method, path.into(), Arc::new(handler)));
        self
    }

    /// Replaces the header-based identity resolver.
    #[must_use]
    pub fn identity_resolver(mut self, resolver: impl IdentityResolver) -> Self {
        self.identity = Some(Arc::new(resolver));
        self
    }

    /// Validates the configuration, registers every endpoint and wires the
    /// pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if the configuration is invalid, an endpoint is
    /// registered twice or is malformed, or a declared endpoint has no
    /// handler.
    pub fn build(self) -> BuildResult<Gateway> {
        let Self {
            config,
            endpoints,
            handlers,
            identity,
        } = self;

        config.validate()?;
        let mut declared = config.endpoint_definitions()?;
        let mut registry = EndpointRegistry::new();

        for (definition, handler) in endpoints {
            if take_declared(&mut declared, definition.method(), definition.path()).is_some() {
                return Err(RegistryError::Duplicate {
                    method: definition.method().to_string(),
                    path: definition.path().to_string(),
                }
                .into());
            }
            registry.register_arc(definition, handler)?;
        }

        for (method, path, handler) in handlers {
            let definition = take_declared(&mut declared, &method, &path)
                .unwrap_or_else(|| EndpointDefinition::new(method, path));
            registry.register_arc(definition, handler)?;
        }

        if let Some(unbound) = declared.first() {
            return Err(BuildError::missing_handler(
                unbound.method().as_str(),
                unbound.path(),
            ));
        }

        for route in &config.health.critical_routes {
            if registry.lookup(route, &Method::GET).is_none() {
                warn!(
                    route = %route,
                    "critical route has no GET endpoint; it will probe unhealthy"
                );
            }
        }

        let state = GatewayState {
            registry: Arc::new(registry),
            breakers: Arc::new(CircuitBreakerManager::new(BreakerConfig {
                failure_threshold: config.breaker.failure_threshold,
                recovery_window: config.breaker.recovery_window(),
                half_open_max_trials: config.breaker.half_open_max_trials,
            })),
            recorder: Arc::new(MetricsRecorder::new(config.metrics.recorder_config())),
            rate_limiter: Arc::new(RateLimiter::new()),
            router: TimeoutRouter::new(config.router.default_timeout()),
        };

        let mut pipeline = Pipeline::builder(
            Arc::clone(&state.registry),
            Arc::clone(&state.breakers),
            Arc::clone(&state.recorder),
        )
        .router(state.router)
        .version(config.server.version.clone())
        .trust_incoming_request_id(config.server.trust_incoming_request_id);
        if config.rate_limit.enforce {
            pipeline = pipeline.rate_limiter(Arc::clone(&state.rate_limiter));
        }
        if let Some(identity) = identity {
            pipeline = pipeline.identity_resolver(identity);
        }
        let pipeline = pipeline.build();

        let prober = HealthProber::new(&state, config.health.critical_routes.clone())
            .with_degraded_threshold(config.health.degraded_threshold());

        info!(
            endpoints = state.registry.len(),
            stages = ?pipeline.stage_names(),
            rate_limit_enforced = config.rate_limit.enforce,
            "gateway built"
        );

        Ok(Gateway::new(state, pipeline, prober, config))
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GatewayBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayBuilder")
            .field("config", &self.config)
            .field("endpoints", &self.endpoints.len())
            .field("handlers", &self.handlers.len())
            .field("custom_identity", &self.identity.is_some())
            .finish()
    }
}

fn take_declared(
    declared: &mut Vec<EndpointDefinition>,
    method: &Method,
    path: &str,
) -> Option<EndpointDefinition> {
    let index = declared
        .iter()
        .position(|d| d.method() == method && d.path() == path)?;
    Some(declared.remove(index))
}
