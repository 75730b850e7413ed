//! 批量调用模块：并发执行多个工具调用并按请求顺序返回结果。
//!
//! # Batch Invocation Module
//!
//! Runs N independent invocations concurrently and returns N results in the
//! order they were requested, regardless of completion order.
//!
//! ## Overview
//!
//! - Every element goes through [`ToolInvoker`](crate::invoker::ToolInvoker),
//!   so breaker, timeout and retry rules apply per element
//! - One failing service never affects calls to another service in the batch
//! - Execution is always best effort: every element runs to completion and
//!   carries its own success flag
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchInvoker`] | Fans requests out and joins them in order |
//! | [`BatchConfig`] | Optional concurrency limit |
//! | [`BatchOutcome`] | Ordered results plus aggregate helpers |

mod executor;

pub use executor::{BatchConfig, BatchInvoker, BatchOutcome};
