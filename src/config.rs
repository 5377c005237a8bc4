//! Configuration management for Floodgate.
//!
//! A declarative YAML surface over the programmatic API: named limits with
//! their rates, the acquire policy, and maintenance cadences.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::Clock;
use crate::error::{FloodgateError, Result};
use crate::limiter::Limiter;
use crate::rate::Rate;
use crate::registry::{BucketRegistry, MaintenanceConfig};

/// Main configuration for a Floodgate limiter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Named rate limits.
    #[serde(default)]
    pub limits: HashMap<String, LimitDefinition>,

    /// Acquire policy.
    #[serde(default)]
    pub acquire: AcquireConfig,

    /// Background maintenance settings.
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
}

/// Rates enforced for one named limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitDefinition {
    /// One or more rates, ordered by increasing limit and interval.
    pub rates: Vec<RateDefinition>,
}

/// A single declared rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateDefinition {
    /// Maximum weight units within the interval.
    pub limit: u64,
    /// Sliding window length in milliseconds.
    pub interval_ms: u64,
}

impl From<&RateDefinition> for Rate {
    fn from(def: &RateDefinition) -> Self {
        Rate::new(def.limit, Duration::from_millis(def.interval_ms))
    }
}

/// Acquire policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireConfig {
    /// Whether rejections raise an error instead of returning `false`.
    #[serde(default = "default_raise_when_fail")]
    pub raise_when_fail: bool,

    /// Maximum total wait before a rejection becomes final. Unset means
    /// fail immediately.
    pub max_delay_ms: Option<u64>,

    /// Scheduling margin added to every computed wait.
    #[serde(default = "default_retry_margin_ms")]
    pub retry_margin_ms: u64,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            raise_when_fail: default_raise_when_fail(),
            max_delay_ms: None,
            retry_margin_ms: default_retry_margin_ms(),
        }
    }
}

fn default_raise_when_fail() -> bool {
    true
}

fn default_retry_margin_ms() -> u64 {
    50
}

/// Background maintenance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceSettings {
    /// Leak cadence in milliseconds.
    #[serde(default = "default_leak_interval_ms")]
    pub leak_interval_ms: u64,

    /// Flush cadence in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Idle time before an empty bucket may be reclaimed, in milliseconds.
    #[serde(default = "default_idle_threshold_ms")]
    pub idle_threshold_ms: u64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            leak_interval_ms: default_leak_interval_ms(),
            flush_interval_ms: default_flush_interval_ms(),
            idle_threshold_ms: default_idle_threshold_ms(),
        }
    }
}

fn default_leak_interval_ms() -> u64 {
    10_000
}

fn default_flush_interval_ms() -> u64 {
    60_000
}

fn default_idle_threshold_ms() -> u64 {
    60_000
}

impl From<&MaintenanceSettings> for MaintenanceConfig {
    fn from(settings: &MaintenanceSettings) -> Self {
        Self {
            leak_interval: Duration::from_millis(settings.leak_interval_ms),
            flush_interval: Duration::from_millis(settings.flush_interval_ms),
            idle_threshold: Duration::from_millis(settings.idle_threshold_ms),
        }
    }
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("failed to parse config: {}", e)))
    }

    /// Build a registry with the declared limits and maintenance settings.
    pub fn build_registry(&self, clock: Arc<dyn Clock>) -> Result<Arc<BucketRegistry>> {
        let registry = BucketRegistry::with_maintenance(clock, (&self.maintenance).into());
        for (name, definition) in &self.limits {
            let rates: Vec<Rate> = definition.rates.iter().map(Rate::from).collect();
            registry.register(name.clone(), rates)?;
        }
        Ok(registry)
    }

    /// Build a fully wired limiter. Must be called from within a tokio
    /// runtime; maintenance tasks start here.
    pub fn build_limiter(&self, clock: Arc<dyn Clock>) -> Result<Limiter> {
        let registry = self.build_registry(clock)?;
        let mut limiter = Limiter::new(registry)
            .with_retry_margin(Duration::from_millis(self.acquire.retry_margin_ms));
        if !self.acquire.raise_when_fail {
            limiter = limiter.no_raise_on_limit();
        }
        if let Some(delay_ms) = self.acquire.max_delay_ms {
            limiter = limiter.with_max_delay(Duration::from_millis(delay_ms));
        }
        Ok(limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
limits:
  api_read:
    rates:
      - limit: 100
        interval_ms: 1000
      - limit: 1000
        interval_ms: 60000
acquire:
  raise_when_fail: false
  max_delay_ms: 2000
  retry_margin_ms: 25
maintenance:
  leak_interval_ms: 5000
  flush_interval_ms: 30000
  idle_threshold_ms: 30000
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.limits["api_read"].rates.len(), 2);
        assert!(!config.acquire.raise_when_fail);
        assert_eq!(config.acquire.max_delay_ms, Some(2000));
        assert_eq!(config.acquire.retry_margin_ms, 25);
        assert_eq!(config.maintenance.leak_interval_ms, 5000);
    }

    #[test]
    fn test_defaults_apply() {
        let config = FloodgateConfig::from_yaml("limits: {}").unwrap();
        assert!(config.acquire.raise_when_fail);
        assert_eq!(config.acquire.max_delay_ms, None);
        assert_eq!(config.acquire.retry_margin_ms, 50);
        assert_eq!(config.maintenance.leak_interval_ms, 10_000);
        assert_eq!(config.maintenance.flush_interval_ms, 60_000);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = FloodgateConfig::from_yaml("limits: [not, a, map]").unwrap_err();
        assert!(matches!(err, FloodgateError::Config(_)));
    }

    #[test]
    fn test_build_registry_validates_rates() {
        let yaml = r#"
limits:
  bad:
    rates:
      - limit: 0
        interval_ms: 1000
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        let result = config.build_registry(Arc::new(ManualClock::new(0)));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_limiter_enforces_declared_rates() {
        let yaml = r#"
limits:
  api:
    rates:
      - limit: 1
        interval_ms: 1000
acquire:
  raise_when_fail: false
"#;
        let config = FloodgateConfig::from_yaml(yaml).unwrap();
        let limiter = config
            .build_limiter(Arc::new(ManualClock::new(0)))
            .unwrap();

        assert!(limiter.try_acquire("api").await.unwrap());
        assert!(!limiter.try_acquire("api").await.unwrap());
    }
}
