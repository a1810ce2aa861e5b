//! The gateway façade.

use agora_config::GatewayConfig;
use agora_core::{Request, Response};
use agora_middleware::{BreakerSnapshot, MiddlewareContext, Pipeline};
use agora_telemetry::{render_metrics, HealthCheckResult, MetricsSnapshot};
use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;

use crate::builder::GatewayBuilder;
use crate::health::HealthProber;
use crate::state::GatewayState;
use crate::tasks::BackgroundTasks;

/// Entry point for every inbound request and every operational read.
///
/// [`handle`](Self::handle) runs the request through the stage pipeline and
/// always returns a response: the handler's own, or a structured error
/// carrying the request id. Exactly one request metric is recorded per call.
#[derive(Debug)]
pub struct Gateway {
    state: GatewayState,
    pipeline: Pipeline,
    prober: HealthProber,
    config: GatewayConfig,
}

impl Gateway {
    pub(crate) fn new(
        state: GatewayState,
        pipeline: Pipeline,
        prober: HealthProber,
        config: GatewayConfig,
    ) -> Self {
        Self {
            state,
            pipeline,
            prober,
            config,
        }
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Processes one inbound request from `client_ip`.
    pub async fn handle(&self, request: Request, client_ip: Option<IpAddr>) -> Response {
        self.pipeline
            .process(MiddlewareContext::for_client(client_ip), request)
            .await
    }

    /// Aggregates the request log and the health board.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.recorder.snapshot()
    }

    /// Returns the latest health result per critical route.
    #[must_use]
    pub fn health_checks(&self) -> Vec<HealthCheckResult> {
        self.state.recorder.health_checks()
    }

    /// Returns every route's breaker state.
    #[must_use]
    pub fn breakers(&self) -> Vec<BreakerSnapshot> {
        self.state.breakers.snapshot()
    }

    /// Renders Prometheus metrics, if the recorder is installed.
    #[must_use]
    pub fn render_prometheus(&self) -> Option<String> {
        render_metrics()
    }

    /// Runs one probe cycle now.
    pub async fn probe_health(&self) -> Vec<HealthCheckResult> {
        self.prober.probe_all().await
    }

    /// Runs one retention sweep now.
    ///
    /// Returns the number of request metrics removed.
    pub fn sweep(&self) -> usize {
        let removed = self.state.recorder.sweep(Utc::now());
        self.state.rate_limiter.prune();
        removed
    }

    /// Starts the periodic health probe (when enabled) and retention sweep.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();
        if self.config.health.enabled && !self.prober.routes().is_empty() {
            tasks.spawn_health_probe(self.prober.clone(), self.config.health.interval());
        }
        tasks.spawn_retention_sweep(
            Arc::clone(&self.state.recorder),
            Arc::clone(&self.state.rate_limiter),
            self.config.metrics.sweep_interval(),
        );
        tasks
    }

    /// Returns the shared state.
    #[must_use]
    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Returns the stage pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Returns the configuration the gateway was built with.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
