//! 工具调用执行器：单次逻辑调用的超时、重试与熔断控制。
//!
//! Single-call execution.
//!
//! [`ToolInvoker`] runs exactly one [`InvocationRequest`] against the resolved
//! service. Order of operations:
//!
//! 1. validate and resolve (unknown service fails fast, breaker untouched)
//! 2. ask the breaker; a rejection returns a `CircuitOpen` result with no I/O
//! 3. call the client under a timeout, retrying transient failures; a panicking
//!    client settles as an `Aborted` failure
//! 4. record the final outcome once into the breaker and the stats

mod types;

pub use types::{FailureKind, InvocationFailure, InvocationRequest, InvocationResult};

use crate::client::ClientError;
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::resilience::{RetryPolicy, Transition};
use crate::stats::StatsCollector;
use crate::Result;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

pub struct ToolInvoker {
    registry: Arc<ServiceRegistry>,
    stats: Arc<StatsCollector>,
    retry: RetryPolicy,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ServiceRegistry>, stats: Arc<StatsCollector>) -> Self {
        Self {
            registry,
            stats,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Execute one invocation.
    ///
    /// Returns `Err` only for programming errors (unknown service, malformed
    /// request). Every backend condition comes back as an `Ok` result with
    /// `success == false`.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationResult> {
        request.validate()?;
        let entry = self.registry.get(&request.service)?;
        Ok(self.invoke_resolved(entry, request).await)
    }

    async fn invoke_resolved(
        &self,
        entry: &ServiceEntry,
        request: InvocationRequest,
    ) -> InvocationResult {
        let invocation_id = Uuid::new_v4().to_string();
        let service = entry.name();

        let permit = match entry.breaker().allow() {
            Ok(permit) => permit,
            Err(open) => {
                self.stats.record_rejected(service);
                debug!(
                    service,
                    tool = %request.tool,
                    invocation_id = %invocation_id,
                    state = %open.state,
                    "call short-circuited by breaker"
                );
                let failure = InvocationFailure {
                    kind: FailureKind::CircuitOpen,
                    message: open.to_string(),
                };
                return InvocationResult::failed(
                    invocation_id,
                    service,
                    &request.tool,
                    failure,
                    Duration::ZERO,
                    0,
                );
            }
        };

        let timeout = request
            .timeout
            .unwrap_or(entry.descriptor().default_timeout);
        let start = Instant::now();
        let call = AssertUnwindSafe(self.call_with_retry(entry, &request, timeout, &invocation_id))
            .catch_unwind()
            .await;
        let elapsed = start.elapsed();

        let (outcome, attempts) = match call {
            Ok(settled) => settled,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                entry.breaker().record_failure(permit);
                self.stats.record_failure(service, elapsed);
                error!(
                    service,
                    tool = %request.tool,
                    invocation_id = %invocation_id,
                    panic = %message,
                    "service client panicked"
                );
                let failure = InvocationFailure {
                    kind: FailureKind::Aborted,
                    message: format!("service client panicked: {}", message),
                };
                return InvocationResult::failed(
                    invocation_id,
                    service,
                    &request.tool,
                    failure,
                    elapsed,
                    1,
                );
            }
        };

        match outcome {
            Ok(payload) => {
                entry.breaker().record_success(permit);
                self.stats.record_success(service, elapsed);
                debug!(
                    service,
                    tool = %request.tool,
                    invocation_id = %invocation_id,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "tool call succeeded"
                );
                InvocationResult::succeeded(invocation_id, &request, payload, elapsed, attempts)
            }
            Err(err) => {
                if entry.breaker().record_failure(permit) == Some(Transition::Tripped) {
                    self.stats.record_trip(service);
                }
                self.stats.record_failure(service, elapsed);
                warn!(
                    service,
                    tool = %request.tool,
                    invocation_id = %invocation_id,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    error = %err,
                    "tool call failed"
                );
                InvocationResult::failed(
                    invocation_id,
                    service,
                    &request.tool,
                    InvocationFailure::from(&err),
                    elapsed,
                    attempts,
                )
            }
        }
    }

    async fn call_with_retry(
        &self,
        entry: &ServiceEntry,
        request: &InvocationRequest,
        timeout: Duration,
        invocation_id: &str,
    ) -> (std::result::Result<serde_json::Value, ClientError>, u32) {
        let mut attempt: u32 = 0;
        loop {
            let result = Self::attempt(entry, request, timeout).await;
            attempt += 1;
            let err = match result {
                Ok(payload) => return (Ok(payload), attempt),
                Err(err) => err,
            };
            match self.retry.should_retry(attempt - 1, &err) {
                Some(delay) => {
                    self.stats.record_retry(entry.name());
                    warn!(
                        service = entry.name(),
                        tool = %request.tool,
                        invocation_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying tool call"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return (Err(err), attempt),
            }
        }
    }

    async fn attempt(
        entry: &ServiceEntry,
        request: &InvocationRequest,
        timeout: Duration,
    ) -> std::result::Result<serde_json::Value, ClientError> {
        match tokio::time::timeout(
            timeout,
            entry.client().invoke(&request.tool, &request.params, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout { after: timeout }),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl std::fmt::Debug for ToolInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInvoker")
            .field("services", &self.registry.len())
            .field("retry", &self.retry)
            .finish()
    }
}
