//! Gateway facade: the invocation capability exposed to the rest of the system.

mod builder;

pub use builder::GatewayBuilder;

use crate::batch::{BatchInvoker, BatchOutcome};
use crate::client::ToolParams;
use crate::health::{HealthMonitor, HealthSnapshot};
use crate::invoker::{InvocationRequest, InvocationResult, ToolInvoker};
use crate::registry::ServiceRegistry;
use crate::resilience::BreakerStatus;
use crate::stats::{ServiceStats, StatsCollector};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Tool invocation as seen by callers.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke_one(
        &self,
        service: &str,
        tool: &str,
        params: ToolParams,
        timeout: Option<Duration>,
    ) -> Result<InvocationResult>;

    async fn invoke_batch(
        &self,
        requests: Vec<InvocationRequest>,
        return_partial: bool,
    ) -> Result<BatchOutcome>;
}

pub struct Gateway {
    registry: Arc<ServiceRegistry>,
    invoker: Arc<ToolInvoker>,
    batch: BatchInvoker,
    health: Arc<HealthMonitor>,
    stats: Arc<StatsCollector>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn services(&self) -> Vec<String> {
        self.registry.names().map(str::to_string).collect()
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult> {
        self.invoker.invoke(request).await
    }

    pub fn health(&self, service: &str) -> Result<HealthSnapshot> {
        self.health.snapshot(service)
    }

    pub fn all_health(&self) -> BTreeMap<String, HealthSnapshot> {
        self.health.snapshot_all()
    }

    pub fn breaker_status(&self, service: &str) -> Result<BreakerStatus> {
        Ok(self.registry.get(service)?.breaker().status())
    }

    pub fn stats(&self) -> BTreeMap<String, ServiceStats> {
        self.stats.snapshot_all()
    }

    pub fn service_stats(&self, service: &str) -> Result<ServiceStats> {
        self.registry.get(service)?;
        Ok(self.stats.snapshot(service).unwrap_or_default())
    }

    /// Run one health-check cycle now.
    pub async fn run_health_check(&self) {
        self.health.check_all().await;
    }

    /// Spawn the periodic health monitor. Abort the handle to stop it.
    pub fn start_health_monitor(&self) -> JoinHandle<()> {
        Arc::clone(&self.health).spawn()
    }
}

#[async_trait]
impl Invoker for Gateway {
    async fn invoke_one(
        &self,
        service: &str,
        tool: &str,
        params: ToolParams,
        timeout: Option<Duration>,
    ) -> Result<InvocationResult> {
        let mut request = InvocationRequest::new(service, tool).with_params(params);
        request.timeout = timeout;
        self.invoker.invoke(request).await
    }

    async fn invoke_batch(
        &self,
        requests: Vec<InvocationRequest>,
        return_partial: bool,
    ) -> Result<BatchOutcome> {
        self.batch.invoke_batch(requests, return_partial).await
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("services", &self.services())
            .field("health", &self.health)
            .finish()
    }
}
