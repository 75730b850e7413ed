//! Shared fixtures for integration tests

#![allow(dead_code)]

use mediahub_gateway::client::{ClientError, ClientResult};
use mediahub_gateway::{FnClient, ServiceClient, ToolParams};
use serde_json::json;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Ok,
    Fail,
    Hang,
    Panic,
}

impl Mode {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Mode::Fail,
            2 => Mode::Hang,
            3 => Mode::Panic,
            _ => Mode::Ok,
        }
    }
}

/// Scripted backend that counts every call it receives.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    pub calls: AtomicUsize,
    mode: AtomicU8,
    delay_ms: AtomicU64,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Self::with_mode(Mode::Fail)
    }

    pub fn with_mode(mode: Mode) -> Arc<Self> {
        let backend = Self::new();
        backend.set_mode(mode);
        backend
    }

    pub fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.set_mode(if failing { Mode::Fail } else { Mode::Ok });
    }

    /// Answer every call only after `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Client that echoes the tool name, fails with a 503 backend error,
    /// never answers, or panics, depending on the current mode.
    pub fn client(self: &Arc<Self>) -> Arc<dyn ServiceClient> {
        let backend = Arc::clone(self);
        Arc::new(FnClient::new(move |tool: String, params: ToolParams| {
            let backend = Arc::clone(&backend);
            async move { backend.respond(tool, params).await }
        }))
    }

    async fn respond(&self, tool: String, params: ToolParams) -> ClientResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mode = Mode::from_u8(self.mode.load(Ordering::SeqCst));
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match mode {
            Mode::Ok => Ok(json!({ "tool": tool, "params": params })),
            Mode::Fail => Err(ClientError::backend(Some(503), "service unavailable")),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(json!(null))
            }
            Mode::Panic => panic!("backend adapter bug in '{}'", tool),
        }
    }
}

/// Client whose calls never finish within any reasonable timeout.
pub fn hanging_client(calls: Arc<AtomicUsize>) -> Arc<dyn ServiceClient> {
    Arc::new(FnClient::new(move |_tool: String, _params: ToolParams| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(json!(null))
        }
    }))
}

/// Client that answers after `delay`, tracking peak concurrency.
pub fn slow_client(
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
) -> Arc<dyn ServiceClient> {
    Arc::new(FnClient::new(move |tool: String, _params: ToolParams| {
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({ "tool": tool }))
        }
    }))
}
