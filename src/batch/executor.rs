//! Batch executor.

use crate::invoker::{FailureKind, InvocationFailure, InvocationRequest, InvocationResult, ToolInvoker};
use crate::Result;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error};

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    /// One result per request, in request order.
    pub results: Vec<InvocationResult>,
    /// Caller's declared tolerance for mixed results. Advisory only.
    pub return_partial: bool,
    pub elapsed_ms: u64,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.results.len()
    }
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
    /// Some elements succeeded and some failed.
    pub fn is_partial(&self) -> bool {
        let ok = self.success_count();
        ok > 0 && ok < self.results.len()
    }
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.success_count() as f64 / self.results.len() as f64
        }
    }
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    /// Upper bound on elements in flight at once; `None` runs all concurrently.
    pub max_concurrency: Option<usize>,
}
impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n.max(1));
        self
    }
}

/// Fans a list of invocations out to [`ToolInvoker`] and joins them in order.
///
/// Each element runs in its own spawned task. If the caller drops the batch
/// future early the tasks still finish, so every started call settles its
/// breaker and stats exactly once; only the results are discarded.
#[derive(Debug, Clone)]
pub struct BatchInvoker {
    invoker: Arc<ToolInvoker>,
    config: BatchConfig,
}

impl BatchInvoker {
    pub fn new(invoker: Arc<ToolInvoker>) -> Self {
        Self {
            invoker,
            config: BatchConfig::default(),
        }
    }
    pub fn with_config(invoker: Arc<ToolInvoker>, config: BatchConfig) -> Self {
        Self { invoker, config }
    }
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Run every request to completion and return results in request order.
    ///
    /// A malformed element or an unknown service rejects the whole batch
    /// before any call starts. After that, failures are per element.
    pub async fn invoke_batch(
        &self,
        requests: Vec<InvocationRequest>,
        return_partial: bool,
    ) -> Result<BatchOutcome> {
        for req in &requests {
            req.validate()?;
            self.invoker.registry().get(&req.service)?;
        }

        let start = Instant::now();
        let total = requests.len();
        let semaphore = self
            .config
            .max_concurrency
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut labels = Vec::with_capacity(total);
        let mut handles = Vec::with_capacity(total);
        for req in requests {
            labels.push((req.service.clone(), req.tool.clone()));
            let invoker = Arc::clone(&self.invoker);
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                invoker.invoke(req).await
            }));
        }

        let joined = join_all(handles).await;
        let results: Vec<InvocationResult> = joined
            .into_iter()
            .zip(labels)
            .enumerate()
            .map(|(index, (joined, (service, tool)))| match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => aborted(&service, &tool, index, e.to_string()),
                Err(join_err) => {
                    error!(service = %service, tool = %tool, index, "batch element task failed: {}", join_err);
                    aborted(&service, &tool, index, join_err.to_string())
                }
            })
            .collect();

        let outcome = BatchOutcome {
            results,
            return_partial,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            total,
            succeeded = outcome.success_count(),
            failed = outcome.failure_count(),
            return_partial,
            elapsed_ms = outcome.elapsed_ms,
            "batch completed"
        );
        Ok(outcome)
    }
}

fn aborted(service: &str, tool: &str, index: usize, message: String) -> InvocationResult {
    InvocationResult::failed(
        format!("batch-element-{}", index),
        service,
        tool,
        InvocationFailure {
            kind: FailureKind::Aborted,
            message,
        },
        Duration::ZERO,
        0,
    )
}
