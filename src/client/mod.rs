//! 服务客户端能力：网关消费的下游调用接口与统一错误形态。
//!
//! The capability the gateway consumes from each backend.
//!
//! A [`ServiceClient`] turns a logical tool name plus parameters into whatever
//! call the backend needs. Implementations must not retry on their own; retry
//! belongs to the [`ToolInvoker`](crate::invoker::ToolInvoker). Every failure
//! is mapped onto the uniform [`ClientError`] shape.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Tool parameters: string keys to opaque JSON values.
pub type ToolParams = serde_json::Map<String, Value>;

pub type ClientResult = std::result::Result<Value, ClientError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    #[error("timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered but reported a failure.
    #[error("backend error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Backend {
        status: Option<u16>,
        message: String,
    },
}

impl ClientError {
    pub fn transport(msg: impl Into<String>) -> Self {
        ClientError::Transport(msg.into())
    }

    pub fn backend(status: Option<u16>, message: impl Into<String>) -> Self {
        ClientError::Backend {
            status,
            message: message.into(),
        }
    }

    /// Timeouts and transport faults may be transient. A well-formed rejection
    /// from the backend is not worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Timeout { .. } | ClientError::Transport(_))
    }
}

#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Execute one tool call. `timeout` is the budget the invoker enforces;
    /// clients may pass it on to their transport.
    async fn invoke(&self, tool: &str, params: &ToolParams, timeout: Duration) -> ClientResult;
}

/// Closure-backed [`ServiceClient`].
///
/// Handy for wiring in-process backends and for scripting behavior in tests.
pub struct FnClient<F> {
    f: F,
}

impl<F, Fut> FnClient<F>
where
    F: Fn(String, ToolParams) -> Fut + Send + Sync,
    Fut: Future<Output = ClientResult> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> ServiceClient for FnClient<F>
where
    F: Fn(String, ToolParams) -> Fut + Send + Sync,
    Fut: Future<Output = ClientResult> + Send,
{
    async fn invoke(&self, tool: &str, params: &ToolParams, _timeout: Duration) -> ClientResult {
        (self.f)(tool.to_string(), params.clone()).await
    }
}
