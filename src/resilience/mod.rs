//! 弹性模式模块：按服务隔离的熔断器与重试策略。
//!
//! # Resilience Primitives Module
//!
//! Failure isolation for downstream services.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | Per-service closed / open / half-open gate |
//! | [`retry`] | Bounded, fixed-backoff retry policy for one logical invocation |
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Failures reached the threshold, requests fail fast
//! - **Half-Open**: A limited number of trial calls test recovery
//!
//! ```rust
//! use mediahub_gateway::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(3)
//!     .with_open_duration(Duration::from_secs(60));
//! let breaker = CircuitBreaker::new("download-client", config);
//!
//! if let Ok(permit) = breaker.allow() {
//!     // Make the backend call...
//!     breaker.record_success(permit);
//! }
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    BreakerPermit, BreakerStatus, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError,
    CircuitState, Transition,
};
pub use retry::RetryPolicy;
