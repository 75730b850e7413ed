//! 网关配置：服务列表、熔断阈值、超时、重试与健康检查参数。
//!
//! Gateway configuration.
//!
//! Loaded once at startup from YAML or JSON. Thresholds and timeouts are
//! per-service constants fixed at configuration time; only the request-level
//! timeout override can change a single call's budget.

use crate::resilience::retry::MAX_RETRIES;
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub defaults: ServiceDefaults,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub batch: BatchSettings,
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDefaults {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub breaker: BreakerSettings,
}

impl Default for ServiceDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            breaker: BreakerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_open_duration_ms")]
    pub open_duration_ms: u64,
    #[serde(default = "default_half_open_trials")]
    pub half_open_trials: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration_ms: default_open_duration_ms(),
            half_open_trials: default_half_open_trials(),
        }
    }
}

/// Per-service breaker overrides; unset fields fall back to the defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakerOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half_open_trials: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<BreakerOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_tool: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_probe_tool")]
    pub probe_tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
            probe_tool: default_probe_tool(),
            probe_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

fn default_timeout_ms() -> u64 {
    30_000
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_open_duration_ms() -> u64 {
    60_000
}
fn default_half_open_trials() -> u32 {
    1
}
fn default_max_retries() -> u32 {
    1
}
fn default_backoff_ms() -> u64 {
    250
}
fn default_health_interval_ms() -> u64 {
    60_000
}
fn default_probe_tool() -> String {
    "ping".to_string()
}

fn invalid(msg: impl Into<String>, field: impl Into<String>) -> Error {
    Error::configuration_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config_validator"),
    )
}

impl GatewayConfig {
    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Apply `GATEWAY_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; unparseable values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(
            lookup: &dyn Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            lookup(key).and_then(|s| s.trim().parse::<T>().ok())
        }

        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;
        if let Some(v) = parsed(lookup, "GATEWAY_DEFAULT_TIMEOUT_MS") {
            self.defaults.timeout_ms = v;
        }
        if let Some(v) = parsed(lookup, "GATEWAY_BREAKER_FAILURE_THRESHOLD") {
            self.defaults.breaker.failure_threshold = v;
        }
        if let Some(v) = parsed(lookup, "GATEWAY_BREAKER_OPEN_DURATION_MS") {
            self.defaults.breaker.open_duration_ms = v;
        }
        if let Some(v) = parsed(lookup, "GATEWAY_BREAKER_HALF_OPEN_TRIALS") {
            self.defaults.breaker.half_open_trials = v;
        }
        if let Some(v) = parsed(lookup, "GATEWAY_MAX_RETRIES") {
            self.retry.max_retries = v;
        }
        if let Some(v) = parsed(lookup, "GATEWAY_RETRY_BACKOFF_MS") {
            self.retry.backoff_ms = v;
        }
        if let Some(v) = parsed(lookup, "GATEWAY_HEALTH_INTERVAL_MS") {
            self.health.interval_ms = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(invalid("at least one service must be configured", "services"));
        }
        if self.defaults.timeout_ms == 0 {
            return Err(invalid("timeout must be positive", "defaults.timeout_ms"));
        }
        if self.health.interval_ms == 0 {
            return Err(invalid("health interval must be positive", "health.interval_ms"));
        }
        if self.health.probe_timeout_ms == Some(0) {
            return Err(invalid(
                "probe timeout must be positive",
                "health.probe_timeout_ms",
            ));
        }
        if self.retry.max_retries > MAX_RETRIES {
            return Err(invalid(
                format!(
                    "max_retries {} exceeds the limit of {}",
                    self.retry.max_retries, MAX_RETRIES
                ),
                "retry.max_retries",
            ));
        }
        if self.batch.max_concurrency == Some(0) {
            return Err(invalid(
                "batch concurrency must be positive",
                "batch.max_concurrency",
            ));
        }

        let mut seen = HashSet::new();
        for (i, svc) in self.services.iter().enumerate() {
            let name = svc.name.trim();
            if name.is_empty() {
                return Err(invalid("service name must not be empty", format!("services[{}].name", i)));
            }
            if !seen.insert(name) {
                return Err(invalid(
                    format!("duplicate service name '{}'", name),
                    format!("services[{}].name", i),
                ));
            }
            if let Err(e) = url::Url::parse(&svc.base_url) {
                return Err(invalid(
                    format!("invalid base_url '{}': {}", svc.base_url, e),
                    format!("services[{}].base_url", i),
                ));
            }
            if svc.timeout_ms == Some(0) {
                return Err(invalid("timeout must be positive", format!("services[{}].timeout_ms", i)));
            }

            let breaker = self.breaker_for(svc);
            if breaker.failure_threshold == 0 {
                return Err(invalid(
                    "failure threshold must be positive",
                    format!("services[{}].breaker.failure_threshold", i),
                ));
            }
            if breaker.half_open_trials == 0 {
                return Err(invalid(
                    "half-open trials must be positive",
                    format!("services[{}].breaker.half_open_trials", i),
                ));
            }
            if breaker.open_duration == Duration::ZERO {
                return Err(invalid(
                    "open duration must be positive",
                    format!("services[{}].breaker.open_duration_ms", i),
                ));
            }
        }
        Ok(())
    }

    /// Find a service by name; surrounding whitespace is ignored on both sides.
    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        let name = name.trim();
        self.services.iter().find(|s| s.name.trim() == name)
    }

    pub fn timeout_for(&self, svc: &ServiceConfig) -> Duration {
        Duration::from_millis(svc.timeout_ms.unwrap_or(self.defaults.timeout_ms))
    }

    pub fn breaker_for(&self, svc: &ServiceConfig) -> CircuitBreakerConfig {
        let defaults = &self.defaults.breaker;
        let overrides = svc.breaker.clone().unwrap_or_default();
        // Built directly so validation sees zero values instead of clamped ones.
        CircuitBreakerConfig {
            failure_threshold: overrides
                .failure_threshold
                .unwrap_or(defaults.failure_threshold),
            open_duration: Duration::from_millis(
                overrides
                    .open_duration_ms
                    .unwrap_or(defaults.open_duration_ms),
            ),
            half_open_trials: overrides
                .half_open_trials
                .unwrap_or(defaults.half_open_trials),
        }
    }

    pub fn probe_tool_for(&self, svc: &ServiceConfig) -> String {
        svc.probe_tool
            .clone()
            .unwrap_or_else(|| self.health.probe_tool.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(self.retry.max_retries)
            .with_backoff(Duration::from_millis(self.retry.backoff_ms))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health.interval_ms)
    }

    pub fn probe_timeout(&self) -> Option<Duration> {
        self.health.probe_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
defaults:
  timeout_ms: 10000
  breaker:
    failure_threshold: 4
retry:
  max_retries: 2
health:
  interval_ms: 30000
  probe_timeout_ms: 2000
services:
  - name: download-client
    base_url: "http://qbittorrent:8080"
    api_key: "secret"
    timeout_ms: 5000
    breaker:
      failure_threshold: 3
      half_open_trials: 2
    probe_tool: app_version
  - name: tv-library
    base_url: "http://sonarr:8989/api/v3"
"#;

    #[test]
    fn test_yaml_defaults_and_overrides() {
        let cfg = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        cfg.validate().unwrap();

        let dl = cfg.service("download-client").unwrap();
        assert_eq!(cfg.timeout_for(dl), Duration::from_millis(5000));
        let b = cfg.breaker_for(dl);
        assert_eq!(b.failure_threshold, 3);
        assert_eq!(b.half_open_trials, 2);
        assert_eq!(b.open_duration, Duration::from_secs(60));
        assert_eq!(cfg.probe_tool_for(dl), "app_version");

        let tv = cfg.service("tv-library").unwrap();
        assert_eq!(cfg.timeout_for(tv), Duration::from_millis(10_000));
        assert_eq!(cfg.breaker_for(tv).failure_threshold, 4);
        assert_eq!(cfg.probe_tool_for(tv), "ping");

        assert_eq!(cfg.retry_policy().max_retries, 2);
        assert_eq!(cfg.retry_policy().backoff, Duration::from_millis(250));
        assert_eq!(cfg.health_interval(), Duration::from_secs(30));
        assert_eq!(cfg.probe_timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_json_config() {
        let cfg = GatewayConfig::from_json_str(
            r#"{"services":[{"name":"media-server","base_url":"http://jellyfin:8096"}]}"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.defaults.timeout_ms, 30_000);
        assert_eq!(cfg.defaults.breaker.failure_threshold, 5);
        assert_eq!(cfg.batch.max_concurrency, None);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let cfg = GatewayConfig::from_yaml_str(
            r#"
services:
  - { name: movies, base_url: "http://radarr:7878" }
  - { name: movies, base_url: "http://radarr2:7878" }
"#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate service name 'movies'"));
        assert_eq!(
            err.context().and_then(|c| c.field_path.clone()).as_deref(),
            Some("services[1].name")
        );
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let cfg = GatewayConfig::from_yaml_str(
            r#"
services:
  - name: movies
    base_url: "http://radarr:7878"
    breaker: { failure_threshold: 0 }
"#,
        )
        .unwrap();
        assert!(matches!(cfg.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_bad_url_and_empty_services_rejected() {
        let cfg = GatewayConfig::from_yaml_str("services: []").unwrap();
        assert!(cfg.validate().is_err());

        let cfg = GatewayConfig::from_yaml_str(
            "services:\n  - { name: movies, base_url: \"radarr without scheme\" }\n",
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        let vars: HashMap<&str, &str> = [
            ("GATEWAY_BREAKER_FAILURE_THRESHOLD", "9"),
            ("GATEWAY_MAX_RETRIES", "0"),
            ("GATEWAY_HEALTH_INTERVAL_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.defaults.breaker.failure_threshold, 9);
        assert_eq!(cfg.retry.max_retries, 0);
        assert_eq!(cfg.health.interval_ms, 30_000);
        // explicit per-service override still wins
        let dl = cfg.service("download-client").unwrap();
        assert_eq!(cfg.breaker_for(dl).failure_threshold, 3);
    }

    #[test]
    fn test_retry_storm_rejected() {
        let mut cfg = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        cfg.retry.max_retries = MAX_RETRIES;
        cfg.validate().unwrap();

        cfg.apply_overrides_from(|k| (k == "GATEWAY_MAX_RETRIES").then(|| "50".to_string()));
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries 50 exceeds the limit of 5"));
    }
}
