//! 调用统计：按服务聚合调用次数、失败数、平均延迟与熔断次数。
//!
//! Per-service call statistics.
//!
//! The set of services is fixed when the collector is built, so every update is
//! a handful of relaxed atomic adds with no lock. Counters are process-lifetime
//! telemetry and reset on restart.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

#[derive(Debug, Default)]
struct ServiceCounters {
    calls: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
    retries: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_count: AtomicU64,
    breaker_trips: AtomicU64,
}

impl ServiceCounters {
    fn record_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.latency_sum_us.fetch_add(us, Ordering::Relaxed);
        self.latency_count.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of one service's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceStats {
    pub calls: u64,
    pub failures: u64,
    /// Calls short-circuited by an open breaker.
    pub rejected: u64,
    pub retries: u64,
    /// Mean latency of calls that reached the backend.
    pub mean_latency_ms: f64,
    pub breaker_trips: u64,
}

#[derive(Debug)]
pub struct StatsCollector {
    services: HashMap<String, ServiceCounters>,
}

impl StatsCollector {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            services: services
                .into_iter()
                .map(|s| (s.into(), ServiceCounters::default()))
                .collect(),
        }
    }

    fn counters(&self, service: &str) -> Option<&ServiceCounters> {
        let c = self.services.get(service);
        if c.is_none() {
            trace!(service, "stats update for unregistered service ignored");
        }
        c
    }

    pub fn record_success(&self, service: &str, latency: Duration) {
        if let Some(c) = self.counters(service) {
            c.calls.fetch_add(1, Ordering::Relaxed);
            c.record_latency(latency);
        }
    }

    pub fn record_failure(&self, service: &str, latency: Duration) {
        if let Some(c) = self.counters(service) {
            c.calls.fetch_add(1, Ordering::Relaxed);
            c.failures.fetch_add(1, Ordering::Relaxed);
            c.record_latency(latency);
        }
    }

    /// A call rejected by an open breaker: counted, but no latency sample.
    pub fn record_rejected(&self, service: &str) {
        if let Some(c) = self.counters(service) {
            c.calls.fetch_add(1, Ordering::Relaxed);
            c.failures.fetch_add(1, Ordering::Relaxed);
            c.rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retry(&self, service: &str) {
        if let Some(c) = self.counters(service) {
            c.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count one `closed → open` transition.
    pub fn record_trip(&self, service: &str) {
        if let Some(c) = self.counters(service) {
            c.breaker_trips.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, service: &str) -> Option<ServiceStats> {
        self.services.get(service).map(|c| {
            let latency_count = c.latency_count.load(Ordering::Relaxed);
            let mean_latency_ms = if latency_count == 0 {
                0.0
            } else {
                c.latency_sum_us.load(Ordering::Relaxed) as f64 / latency_count as f64 / 1000.0
            };
            ServiceStats {
                calls: c.calls.load(Ordering::Relaxed),
                failures: c.failures.load(Ordering::Relaxed),
                rejected: c.rejected.load(Ordering::Relaxed),
                retries: c.retries.load(Ordering::Relaxed),
                mean_latency_ms,
                breaker_trips: c.breaker_trips.load(Ordering::Relaxed),
            }
        })
    }

    pub fn snapshot_all(&self) -> BTreeMap<String, ServiceStats> {
        self.services
            .keys()
            .filter_map(|name| self.snapshot(name).map(|s| (name.clone(), s)))
            .collect()
    }
}
