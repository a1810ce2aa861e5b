//! Periodic background work.
//!
//! Two independent loops, each on its own interval:
//!
//! - **health probe**: one [`HealthProber::probe_all`] cycle per tick
//! - **retention sweep**: drops request metrics past their retention window
//!   and prunes idle rate-limit windows
//!
//! Both loops stop when [`BackgroundTasks::stop`] is awaited or the handle is
//! dropped. A missed tick is delayed rather than replayed, so a slow probe
//! cycle never queues up extra cycles.

use agora_middleware::RateLimiter;
use agora_telemetry::MetricsRecorder;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::health::HealthProber;

/// Handle to the running periodic tasks.
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Starts an empty task set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Runs a health probe cycle every `interval`, starting immediately.
    pub fn spawn_health_probe(&mut self, prober: HealthProber, interval: Duration) {
        info!(
            routes = prober.routes().len(),
            interval_secs = interval.as_secs(),
            "health probe started"
        );
        let start = Instant::now();
        self.spawn_periodic("health_probe", start, interval, move || {
            let prober = prober.clone();
            async move {
                prober.probe_all().await;
            }
        });
    }

    /// Runs the retention sweep every `interval`. The first sweep happens one
    /// interval after start.
    pub fn spawn_retention_sweep(
        &mut self,
        recorder: Arc<MetricsRecorder>,
        limiter: Arc<RateLimiter>,
        interval: Duration,
    ) {
        info!(interval_secs = interval.as_secs(), "retention sweep started");
        let start = Instant::now() + interval;
        self.spawn_periodic("retention_sweep", start, interval, move || {
            let removed = recorder.sweep(Utc::now());
            let pruned = limiter.prune();
            debug!(removed, pruned, "retention sweep finished");
            async {}
        });
    }

    fn spawn_periodic<F, Fut>(
        &mut self,
        name: &'static str,
        start: Instant,
        period: Duration,
        mut tick: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let shutdown = self.shutdown.clone();

        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!(task = name, "background task received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        tokio::select! {
                            () = shutdown.cancelled() => break,
                            () = tick() => {}
                        }
                    }
                }
            }
        }));
    }

    /// Returns the number of running loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if no loop was started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every loop to stop and waits for them to finish.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
        info!("background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GatewayState;
    use agora_core::{EndpointDefinition, EndpointRegistry, HandlerError, Request, Response};
    use agora_middleware::{BreakerConfig, CircuitBreakerManager, TimeoutRouter};
    use agora_telemetry::{RecorderConfig, RequestMetric};
    use bytes::Bytes;
    use chrono::TimeDelta;
    use http::Method;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken as Token;

    fn state(calls: &Arc<AtomicUsize>) -> GatewayState {
        let calls = Arc::clone(calls);
        let mut registry = EndpointRegistry::new();
        registry
            .register(
                EndpointDefinition::new(Method::GET, "/api/health"),
                move |_req: Request, _cancel: Token| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, HandlerError>(Response::new(Bytes::new())) }
                },
            )
            .unwrap();

        GatewayState {
            registry: Arc::new(registry),
            breakers: Arc::new(CircuitBreakerManager::new(BreakerConfig::default())),
            recorder: Arc::new(MetricsRecorder::new(RecorderConfig::default())),
            rate_limiter: Arc::new(RateLimiter::new()),
            router: TimeoutRouter::default(),
        }
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_probe_runs_on_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = state(&calls);
        let mut tasks = BackgroundTasks::new();
        tasks.spawn_health_probe(
            HealthProber::new(&state, vec!["/api/health".to_string()]),
            Duration::from_secs(30),
        );

        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tasks.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retention_sweep_drops_expired_metrics() {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = state(&calls);
        let ended_at = Utc::now() - TimeDelta::hours(2);
        state.recorder.record(RequestMetric {
            request_id: agora_core::RequestId::new(),
            method: "GET".to_string(),
            path: "/api/health".to_string(),
            status: 200,
            started_at: ended_at,
            ended_at,
            response_time: Duration::from_millis(3),
            client_ip: None,
            user_id: None,
            error: None,
        });

        let mut tasks = BackgroundTasks::new();
        tasks.spawn_retention_sweep(
            Arc::clone(&state.recorder),
            Arc::clone(&state.rate_limiter),
            Duration::from_secs(3600),
        );
        settle().await;
        assert_eq!(state.recorder.len(), 1);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        settle().await;
        assert!(state.recorder.is_empty());

        tasks.stop().await;
    }

    #[tokio::test]
    async fn test_drop_cancels_loops() {
        let calls = Arc::new(AtomicUsize::new(0));
        let state = state(&calls);
        let mut tasks = BackgroundTasks::new();
        tasks.spawn_health_probe(
            HealthProber::new(&state, vec!["/api/health".to_string()]),
            Duration::from_secs(30),
        );
        let token = tasks.shutdown.clone();
        assert_eq!(tasks.len(), 1);

        drop(tasks);
        assert!(token.is_cancelled());
    }
}
