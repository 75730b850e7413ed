//! 服务注册表 — 服务名到客户端、熔断器与配置的只读映射
//!
//! Service registry: the single source of truth for which services exist.
//!
//! Built once at startup and immutable afterwards. The mutable pieces (breaker
//! state) live inside each [`ServiceEntry`] behind their own lock, so the map
//! itself can be shared freely across tasks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::ServiceClient;
use crate::clock::{system_clock, Clock};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig};
use crate::{Error, ErrorContext, Result};

pub const DEFAULT_PROBE_TOOL: &str = "ping";

/// Static description of one backend.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub client: Arc<dyn ServiceClient>,
    pub default_timeout: Duration,
    pub breaker: CircuitBreakerConfig,
    /// Side-effect-free tool used by the health monitor.
    pub probe_tool: String,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, client: Arc<dyn ServiceClient>) -> Self {
        Self {
            name: name.into(),
            client,
            default_timeout: Duration::from_secs(30),
            breaker: CircuitBreakerConfig::default(),
            probe_tool: DEFAULT_PROBE_TOOL.to_string(),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_breaker(mut self, breaker: CircuitBreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_probe_tool(mut self, tool: impl Into<String>) -> Self {
        self.probe_tool = tool.into();
        self
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("default_timeout", &self.default_timeout)
            .field("breaker", &self.breaker)
            .field("probe_tool", &self.probe_tool)
            .finish_non_exhaustive()
    }
}

/// A registered service: its descriptor plus the breaker that guards it.
#[derive(Debug)]
pub struct ServiceEntry {
    descriptor: ServiceDescriptor,
    breaker: CircuitBreaker,
}

impl ServiceEntry {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn client(&self) -> &Arc<dyn ServiceClient> {
        &self.descriptor.client
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[derive(Debug)]
pub struct ServiceRegistry {
    services: BTreeMap<String, Arc<ServiceEntry>>,
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Result<&Arc<ServiceEntry>> {
        self.services
            .get(name)
            .ok_or_else(|| Error::unknown_service(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Service names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.services.keys().map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Arc<ServiceEntry>> {
        self.services.values()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

pub struct ServiceRegistryBuilder {
    clock: Arc<dyn Clock>,
    services: BTreeMap<String, Arc<ServiceEntry>>,
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self {
            clock: system_clock(),
            services: BTreeMap::new(),
        }
    }

    /// Clock shared by every breaker registered after this call.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Add a service. The name is trimmed here and nowhere else.
    pub fn register(mut self, mut descriptor: ServiceDescriptor) -> Result<Self> {
        descriptor.name = descriptor.name.trim().to_string();
        let name = descriptor.name.clone();
        if name.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "service name must not be empty",
                ErrorContext::new().with_source("service_registry"),
            ));
        }
        if self.services.contains_key(&name) {
            return Err(Error::configuration_with_context(
                format!("service '{}' registered twice", name),
                ErrorContext::new()
                    .with_field_path(name)
                    .with_source("service_registry"),
            ));
        }

        let breaker =
            CircuitBreaker::with_clock(name.clone(), descriptor.breaker.clone(), self.clock.clone());
        self.services
            .insert(name, Arc::new(ServiceEntry { descriptor, breaker }));
        Ok(self)
    }

    pub fn build(self) -> Result<ServiceRegistry> {
        Ok(ServiceRegistry {
            services: self.services,
        })
    }
}

impl Default for ServiceRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
