//! 健康监测：定期通过同一调用路径探测每个服务并发布最新快照。
//!
//! Periodic health probing.
//!
//! Probes run through the same [`ToolInvoker`] path as production traffic, so
//! a failing probe counts against the breaker and an open breaker shows up as
//! an unhealthy snapshot. Snapshots are published with `ArcSwapOption`; reads
//! never wait for a cycle and are at most one interval stale.

use crate::clock::{system_clock, Clock};
use crate::invoker::{InvocationRequest, ToolInvoker};
use crate::resilience::CircuitState;
use crate::Result;
use arc_swap::ArcSwapOption;
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

pub const NOT_YET_CHECKED: &str = "not yet checked";

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub interval: Duration,
    /// Overrides each service's default timeout for probe calls.
    pub probe_timeout: Option<Duration>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            probe_timeout: None,
        }
    }
}

impl HealthConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub service: String,
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
    pub checked_at: Option<SystemTime>,
    pub breaker_state: CircuitState,
}

impl HealthSnapshot {
    fn unchecked(service: &str, breaker_state: CircuitState) -> Self {
        Self {
            service: service.to_string(),
            healthy: false,
            latency_ms: None,
            last_error: Some(NOT_YET_CHECKED.to_string()),
            checked_at: None,
            breaker_state,
        }
    }
}

pub struct HealthMonitor {
    invoker: Arc<ToolInvoker>,
    config: HealthConfig,
    clock: Arc<dyn Clock>,
    snapshots: HashMap<String, ArcSwapOption<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(invoker: Arc<ToolInvoker>, config: HealthConfig) -> Self {
        Self::with_clock(invoker, config, system_clock())
    }

    pub fn with_clock(invoker: Arc<ToolInvoker>, config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        let snapshots = invoker
            .registry()
            .names()
            .map(|name| (name.to_string(), ArcSwapOption::empty()))
            .collect();
        Self {
            invoker,
            config,
            clock,
            snapshots,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Start the periodic task. The first cycle runs immediately.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            services = self.snapshots.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            "health monitor started"
        );

        loop {
            interval.tick().await;
            self.check_all().await;
        }
    }

    /// Probe every service concurrently and publish fresh snapshots.
    ///
    /// Each probe runs in its own task, so a probe that panics only marks its
    /// own service unhealthy.
    pub async fn check_all(&self) {
        let names: Vec<String> = self
            .invoker
            .registry()
            .names()
            .map(str::to_string)
            .collect();
        let probes = names.iter().map(|name| {
            tokio::spawn(Self::probe(
                Arc::clone(&self.invoker),
                Arc::clone(&self.clock),
                self.config.probe_timeout,
                name.clone(),
            ))
        });
        let joined = join_all(probes).await;

        let mut unhealthy = 0usize;
        for (name, joined) in names.iter().zip(joined) {
            let snapshot = match joined {
                Ok(snapshot) => snapshot,
                Err(join_err) => {
                    error!(service = %name, "health probe task failed: {}", join_err);
                    self.failed_snapshot(name, format!("probe task failed: {}", join_err))
                }
            };
            if !snapshot.healthy {
                unhealthy += 1;
            }
            if let Some(slot) = self.snapshots.get(&snapshot.service) {
                slot.store(Some(Arc::new(snapshot)));
            }
        }
        debug!(services = names.len(), unhealthy, "health check cycle completed");
    }

    fn failed_snapshot(&self, service: &str, error: String) -> HealthSnapshot {
        let breaker_state = self
            .invoker
            .registry()
            .get(service)
            .map(|e| e.breaker().state())
            .unwrap_or(CircuitState::Closed);
        HealthSnapshot {
            service: service.to_string(),
            healthy: false,
            latency_ms: None,
            last_error: Some(error),
            checked_at: Some(self.clock.system_time()),
            breaker_state,
        }
    }

    async fn probe(
        invoker: Arc<ToolInvoker>,
        clock: Arc<dyn Clock>,
        probe_timeout: Option<Duration>,
        service: String,
    ) -> HealthSnapshot {
        let registry = invoker.registry();
        let (probe_tool, breaker_state) = match registry.get(&service) {
            Ok(entry) => (entry.descriptor().probe_tool.clone(), entry.breaker().state()),
            Err(e) => {
                return HealthSnapshot {
                    last_error: Some(e.to_string()),
                    ..HealthSnapshot::unchecked(&service, CircuitState::Closed)
                }
            }
        };

        let mut request = InvocationRequest::new(service.clone(), probe_tool);
        if let Some(timeout) = probe_timeout {
            request = request.with_timeout(timeout);
        }

        let checked_at = Some(clock.system_time());
        let snapshot = match invoker.invoke(request).await {
            Ok(result) => {
                let state = registry
                    .get(&service)
                    .map(|e| e.breaker().state())
                    .unwrap_or(breaker_state);
                HealthSnapshot {
                    service: service.clone(),
                    healthy: result.success,
                    latency_ms: (result.attempts > 0).then_some(result.elapsed_ms),
                    last_error: result.error.map(|e| e.to_string()),
                    checked_at,
                    breaker_state: state,
                }
            }
            Err(e) => HealthSnapshot {
                service: service.clone(),
                healthy: false,
                latency_ms: None,
                last_error: Some(e.to_string()),
                checked_at,
                breaker_state,
            },
        };

        if !snapshot.healthy {
            warn!(
                service = %service,
                breaker = %snapshot.breaker_state,
                error = snapshot.last_error.as_deref().unwrap_or(""),
                "health probe failed"
            );
        }
        snapshot
    }

    /// Last published snapshot for `service`.
    pub fn snapshot(&self, service: &str) -> Result<HealthSnapshot> {
        let entry = self.invoker.registry().get(service)?;
        let snapshot = self
            .snapshots
            .get(service)
            .and_then(|slot| slot.load_full())
            .map(|s| s.as_ref().clone())
            .unwrap_or_else(|| HealthSnapshot::unchecked(service, entry.breaker().state()));
        Ok(snapshot)
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, HealthSnapshot> {
        self.invoker
            .registry()
            .names()
            .filter_map(|name| self.snapshot(name).ok().map(|s| (name.to_string(), s)))
            .collect()
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("config", &self.config)
            .field("services", &self.snapshots.len())
            .finish()
    }
}
