use crate::client::{ClientError, ToolParams};
use crate::{Error, ErrorContext, Result};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub service: String,
    pub tool: String,
    pub params: ToolParams,
    /// Overrides the service's default timeout for this call only.
    pub timeout: Option<Duration>,
}

impl InvocationRequest {
    pub fn new(service: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            tool: tool.into(),
            params: ToolParams::new(),
            timeout: None,
        }
    }

    pub fn with_params(mut self, params: ToolParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Reject requests that can never succeed regardless of backend state.
    pub fn validate(&self) -> Result<()> {
        if self.tool.trim().is_empty() {
            return Err(Error::validation_with_context(
                "tool name must not be empty",
                ErrorContext::new()
                    .with_field_path("tool")
                    .with_details(format!("service: {}", self.service))
                    .with_source("invocation_request"),
            ));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::validation_with_context(
                "timeout override must be positive",
                ErrorContext::new()
                    .with_field_path("timeout")
                    .with_source("invocation_request"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Short-circuited by an open breaker; the backend was not contacted.
    CircuitOpen,
    Timeout,
    Transport,
    /// The backend responded and reported failure.
    Backend,
    /// The client panicked or the invocation task died before producing an outcome.
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::CircuitOpen => "circuit_open",
            FailureKind::Timeout => "timeout",
            FailureKind::Transport => "transport",
            FailureKind::Backend => "backend",
            FailureKind::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ClientError> for InvocationFailure {
    fn from(e: &ClientError) -> Self {
        let kind = match e {
            ClientError::Timeout { .. } => FailureKind::Timeout,
            ClientError::Transport(_) => FailureKind::Transport,
            ClientError::Backend { .. } => FailureKind::Backend,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one logical invocation. Runtime failures are carried here as
/// data rather than returned as errors.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    pub invocation_id: String,
    pub service: String,
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationFailure>,
    pub elapsed_ms: u64,
    /// Backend attempts made; zero when short-circuited.
    pub attempts: u32,
    #[serde(skip)]
    elapsed: Duration,
}

impl InvocationResult {
    pub(crate) fn succeeded(
        invocation_id: String,
        request: &InvocationRequest,
        payload: Value,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            invocation_id,
            service: request.service.clone(),
            tool: request.tool.clone(),
            success: true,
            payload: Some(payload),
            error: None,
            elapsed_ms: elapsed.as_millis() as u64,
            attempts,
            elapsed,
        }
    }

    pub(crate) fn failed(
        invocation_id: String,
        service: &str,
        tool: &str,
        failure: InvocationFailure,
        elapsed: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            invocation_id,
            service: service.to_string(),
            tool: tool.to_string(),
            success: false,
            payload: None,
            error: Some(failure),
            elapsed_ms: elapsed.as_millis() as u64,
            attempts,
            elapsed,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn is_circuit_open(&self) -> bool {
        self.failure_kind() == Some(FailureKind::CircuitOpen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builder() {
        let req = InvocationRequest::new("tv-library", "series_search")
            .with_param("term", "severance")
            .with_param("limit", 5)
            .with_timeout(Duration::from_secs(3));
        assert_eq!(req.params["term"], json!("severance"));
        assert_eq!(req.params["limit"], json!(5));
        assert_eq!(req.timeout, Some(Duration::from_secs(3)));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let empty_tool = InvocationRequest::new("tv-library", "  ");
        assert!(matches!(empty_tool.validate(), Err(Error::Validation { .. })));

        let zero_timeout = InvocationRequest::new("tv-library", "x").with_timeout(Duration::ZERO);
        assert!(matches!(zero_timeout.validate(), Err(Error::Validation { .. })));
    }

    #[test]
    fn test_failure_from_client_error() {
        let f = InvocationFailure::from(&ClientError::backend(Some(409), "already queued"));
        assert_eq!(f.kind, FailureKind::Backend);
        assert_eq!(f.to_string(), "backend: backend error (HTTP 409): already queued");
    }

    #[test]
    fn test_result_serializes_without_internal_duration() {
        let req = InvocationRequest::new("media-server", "sessions");
        let r = InvocationResult::succeeded(
            "id-1".into(),
            &req,
            json!([]),
            Duration::from_millis(42),
            1,
        );
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["elapsed_ms"], json!(42));
        assert_eq!(v["success"], json!(true));
        assert!(v.get("error").is_none());
        assert!(v.get("elapsed").is_none());
        assert_eq!(r.elapsed(), Duration::from_millis(42));
    }
}
