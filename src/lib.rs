//! # mediahub-gateway
//!
//! 面向家庭媒体自动化服务的弹性多后端工具调用层。
//!
//! Resilient multi-backend tool invocation for home media automation services
//! (download client, library managers, media server).
//!
//! ## Overview
//!
//! The gateway fronts several independent backends and exposes them through one
//! uniform tool-invocation interface. This crate is the part that keeps a
//! misbehaving backend from dragging the rest down:
//!
//! - **Health**: a periodic monitor probes every service and publishes snapshots
//! - **Isolation**: each service has its own circuit breaker
//! - **Execution**: single or batched calls with timeout and bounded retry
//! - **Observability**: running per-service call statistics
//!
//! Backend failures are data, not errors: an [`InvocationResult`] with
//! `success == false` says why. Only programming mistakes such as an unknown
//! service name come back as [`Error`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mediahub_gateway::{Gateway, GatewayConfig, Invoker};
//!
//! #[tokio::main]
//! async fn main() -> mediahub_gateway::Result<()> {
//!     let mut config = GatewayConfig::from_path("gateway.yaml")?;
//!     config.apply_env_overrides();
//!
//!     let gateway = Gateway::builder().with_http_services(&config)?.build()?;
//!     let _monitor = gateway.start_health_monitor();
//!
//!     let result = gateway
//!         .invoke_one("download-client", "queue_status", Default::default(), None)
//!         .await?;
//!     if !result.success {
//!         eprintln!("queue unavailable: {:?}", result.error);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`gateway`] | Facade and builder exposing the [`Invoker`] capability |
//! | [`invoker`] | Single-call execution with timeout, retry and breaker gating |
//! | [`batch`] | Concurrent, order-preserving batch execution |
//! | [`health`] | Periodic health probes and snapshots |
//! | [`stats`] | Per-service call statistics |
//! | [`registry`] | Immutable service name → client/breaker mapping |
//! | [`resilience`] | Circuit breaker and retry policy |
//! | [`client`] | The `ServiceClient` capability consumed from backends |
//! | [`transport`] | Reference JSON-over-HTTP client |
//! | [`config`] | YAML/JSON configuration |
//! | [`clock`] | Injectable time source |

pub mod batch;
pub mod client;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod health;
pub mod invoker;
pub mod registry;
pub mod resilience;
pub mod stats;
pub mod transport;

// Re-export main types for convenience
pub use batch::{BatchInvoker, BatchOutcome};
pub use client::{ClientError, FnClient, ServiceClient, ToolParams};
pub use config::GatewayConfig;
pub use gateway::{Gateway, GatewayBuilder, Invoker};
pub use health::{HealthMonitor, HealthSnapshot};
pub use invoker::{FailureKind, InvocationFailure, InvocationRequest, InvocationResult, ToolInvoker};
pub use registry::{ServiceDescriptor, ServiceRegistry};
pub use resilience::{BreakerStatus, CircuitBreakerConfig, CircuitState, RetryPolicy};
pub use stats::{ServiceStats, StatsCollector};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
