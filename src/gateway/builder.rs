use crate::batch::{BatchConfig, BatchInvoker};
use crate::client::ServiceClient;
use crate::clock::{system_clock, Clock};
use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::health::{HealthConfig, HealthMonitor};
use crate::invoker::ToolInvoker;
use crate::registry::{ServiceDescriptor, ServiceRegistryBuilder};
use crate::resilience::RetryPolicy;
use crate::stats::StatsCollector;
use crate::transport::HttpServiceClient;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating a [`Gateway`] with custom configuration.
///
/// Keep this surface area small and predictable.
pub struct GatewayBuilder {
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    health: HealthConfig,
    batch: BatchConfig,
    services: Vec<ServiceDescriptor>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            clock: system_clock(),
            retry: RetryPolicy::default(),
            health: HealthConfig::default(),
            batch: BatchConfig::default(),
            services: Vec::new(),
        }
    }

    /// Take retry, health and batch settings from configuration. Services are
    /// registered separately with [`with_service`](Self::with_service) or
    /// [`with_http_services`](Self::with_http_services).
    pub fn with_config(mut self, cfg: &GatewayConfig) -> Self {
        self.retry = cfg.retry_policy();
        self.health = HealthConfig {
            interval: cfg.health_interval(),
            probe_timeout: cfg.probe_timeout(),
        };
        self.batch = BatchConfig {
            max_concurrency: cfg.batch.max_concurrency,
        };
        self
    }

    /// Inject the time source used by breakers and health timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health.interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.health.probe_timeout = Some(timeout);
        self
    }

    /// Limit how many batch elements run at once.
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.batch = self.batch.with_max_concurrency(n);
        self
    }

    pub fn with_service(mut self, descriptor: ServiceDescriptor) -> Self {
        self.services.push(descriptor);
        self
    }

    /// Register one service from config with an explicit client.
    pub fn with_configured_service(
        self,
        cfg: &GatewayConfig,
        name: &str,
        client: Arc<dyn ServiceClient>,
    ) -> Result<Self> {
        let svc = cfg.service(name).ok_or_else(|| crate::Error::unknown_service(name))?;
        let descriptor = ServiceDescriptor::new(svc.name.clone(), client)
            .with_default_timeout(cfg.timeout_for(svc))
            .with_breaker(cfg.breaker_for(svc))
            .with_probe_tool(cfg.probe_tool_for(svc));
        Ok(self.with_service(descriptor))
    }

    /// Apply `cfg` and register every configured service behind an
    /// [`HttpServiceClient`].
    pub fn with_http_services(mut self, cfg: &GatewayConfig) -> Result<Self> {
        cfg.validate()?;
        self = self.with_config(cfg);
        for svc in &cfg.services {
            let client: Arc<dyn ServiceClient> = Arc::new(HttpServiceClient::from_config(svc)?);
            self = self.with_configured_service(cfg, &svc.name, client)?;
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Gateway> {
        let mut registry = ServiceRegistryBuilder::new().with_clock(self.clock.clone());
        for descriptor in self.services {
            registry = registry.register(descriptor)?;
        }
        let registry = Arc::new(registry.build()?);

        let stats = Arc::new(StatsCollector::new(registry.names()));
        let invoker = Arc::new(
            ToolInvoker::new(Arc::clone(&registry), Arc::clone(&stats)).with_retry_policy(self.retry),
        );
        let batch = BatchInvoker::with_config(Arc::clone(&invoker), self.batch);
        let health = Arc::new(HealthMonitor::with_clock(
            Arc::clone(&invoker),
            self.health,
            self.clock,
        ));

        Ok(Gateway {
            registry,
            invoker,
            batch,
            health,
            stats,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
