// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm Configuration
//
// Every field has a serde default so a partial YAML/JSON document (or none at
// all) yields a usable configuration. Unknown keys are ignored. Durations are
// humantime strings ("10s", "5m"). `validate()` is called by the coordinator
// during initialize; an invalid configuration moves the swarm to `failed`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::objective::SwarmStrategy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Top level
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub mode: SwarmMode,

    /// Decomposition strategy for objectives submitted without tasks.
    #[serde(default)]
    pub strategy: SwarmStrategy,

    #[serde(default = "default_max_agents")]
    pub max_agents: usize,

    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    #[serde(with = "humantime_serde", default = "default_max_duration")]
    pub max_duration: Duration,

    #[serde(default)]
    pub resource_limits: ResourceLimits,

    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,

    #[serde(default)]
    pub monitoring: MonitoringConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub scheduling: SchedulingConfig,

    #[serde(default)]
    pub work_stealing: WorkStealingConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,

    #[serde(default)]
    pub conflict: ConflictConfig,
}

fn default_name() -> String {
    "hivemind".to_string()
}

fn default_max_agents() -> usize {
    10
}

fn default_max_tasks() -> usize {
    100
}

fn default_max_duration() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_quality_threshold() -> f64 {
    0.8
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            mode: SwarmMode::default(),
            strategy: SwarmStrategy::default(),
            max_agents: default_max_agents(),
            max_tasks: default_max_tasks(),
            max_duration: default_max_duration(),
            resource_limits: ResourceLimits::default(),
            quality_threshold: default_quality_threshold(),
            monitoring: MonitoringConfig::default(),
            performance: PerformanceConfig::default(),
            scheduling: SchedulingConfig::default(),
            work_stealing: WorkStealingConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            conflict: ConflictConfig::default(),
        }
    }
}

/// Coordination topology. Only a single coordinating process is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwarmMode {
    #[default]
    Centralized,
    Distributed,
    Hierarchical,
    Mesh,
    Hybrid,
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default = "default_memory_mb")]
    pub memory_mb: f64,
    #[serde(default = "default_cpu_cores")]
    pub cpu_cores: f64,
    #[serde(default = "default_disk_mb")]
    pub disk_mb: f64,
}

fn default_memory_mb() -> f64 {
    4096.0
}

fn default_cpu_cores() -> f64 {
    4.0
}

fn default_disk_mb() -> f64 {
    10240.0
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: default_memory_mb(),
            cpu_cores: default_cpu_cores(),
            disk_mb: default_disk_mb(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Agents silent for three intervals are marked `error`.
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_metrics_interval")]
    pub metrics_interval: Duration,
    #[serde(with = "humantime_serde", default = "default_health_check_interval")]
    pub health_check_interval: Duration,
    #[serde(default = "default_event_history_limit")]
    pub event_history_limit: usize,
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_metrics_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_health_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_event_history_limit() -> usize {
    1000
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            metrics_interval: default_metrics_interval(),
            health_check_interval: default_health_check_interval(),
            event_history_limit: default_event_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Maximum tasks executing at once across the swarm.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(with = "humantime_serde", default = "default_task_timeout")]
    pub default_timeout: Duration,
    #[serde(with = "humantime_serde", default = "default_shutdown_grace_period")]
    pub shutdown_grace_period: Duration,
}

fn default_max_concurrency() -> usize {
    10
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_shutdown_grace_period() -> Duration {
    Duration::from_secs(30)
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_timeout: default_task_timeout(),
            shutdown_grace_period: default_shutdown_grace_period(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchedulingStrategyKind {
    #[default]
    Capability,
    RoundRobin,
    LeastLoaded,
    Affinity,
}

impl SchedulingStrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulingStrategyKind::Capability => "capability",
            SchedulingStrategyKind::RoundRobin => "round-robin",
            SchedulingStrategyKind::LeastLoaded => "least-loaded",
            SchedulingStrategyKind::Affinity => "affinity",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "capability" => Some(Self::Capability),
            "round-robin" => Some(Self::RoundRobin),
            "least-loaded" => Some(Self::LeastLoaded),
            "affinity" => Some(Self::Affinity),
            _ => None,
        }
    }
}

/// What happens to the dependents of a task that failed permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Cancel every transitive dependent.
    #[default]
    FailFast,
    /// Mark transitive dependents failed; independent branches keep running.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default)]
    pub strategy: SchedulingStrategyKind,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategyKind::default(),
            failure_policy: FailurePolicy::default(),
            default_max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkStealingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(with = "humantime_serde", default = "default_steal_interval")]
    pub interval: Duration,
    /// Agents whose workload exceeds this are steal victims.
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: f64,
}

fn default_true() -> bool {
    true
}

fn default_steal_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_high_water_mark() -> f64 {
    0.6
}

impl Default for WorkStealingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_steal_interval(),
            high_water_mark: default_high_water_mark(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward tripping.
    #[serde(with = "humantime_serde", default = "default_breaker_window")]
    pub window: Duration,
    #[serde(with = "humantime_serde", default = "default_breaker_cooldown")]
    pub cooldown: Duration,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_breaker_window() -> Duration {
    Duration::from_secs(60)
}

fn default_breaker_cooldown() -> Duration {
    Duration::from_secs(30)
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            window: default_breaker_window(),
            cooldown: default_breaker_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    #[default]
    Priority,
    Timestamp,
    Voting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictConfig {
    #[serde(default)]
    pub strategy: ConflictStrategy,
    /// Agent names allowed to vote; empty means every registered agent.
    #[serde(default)]
    pub arbiters: Vec<String>,
    /// Fraction of arbiters a winner needs under voting.
    #[serde(default = "default_quorum")]
    pub quorum: f64,
}

fn default_quorum() -> f64 {
    0.5
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::default(),
            arbiters: Vec::new(),
            quorum: default_quorum(),
        }
    }
}

// ============================================================================
// Loading & Validation
// ============================================================================

impl SwarmConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Apply `HIVEMIND_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        let vars: HashMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with("HIVEMIND_"))
            .collect();
        self.apply_overrides(&vars);
    }

    /// Apply overrides from an explicit variable map. Unparseable values are
    /// logged and ignored.
    pub fn apply_overrides(&mut self, vars: &HashMap<String, String>) {
        for (key, val) in vars {
            let applied = match key.as_str() {
                "HIVEMIND_SWARM_NAME" => {
                    self.name = val.clone();
                    true
                }
                "HIVEMIND_MAX_AGENTS" => set_parsed(&mut self.max_agents, val),
                "HIVEMIND_MAX_TASKS" => set_parsed(&mut self.max_tasks, val),
                "HIVEMIND_MAX_CONCURRENCY" => {
                    set_parsed(&mut self.performance.max_concurrency, val)
                }
                "HIVEMIND_HEARTBEAT_INTERVAL" => {
                    set_duration(&mut self.monitoring.heartbeat_interval, val)
                }
                "HIVEMIND_TASK_TIMEOUT" => set_duration(&mut self.performance.default_timeout, val),
                "HIVEMIND_SCHEDULING_STRATEGY" => match SchedulingStrategyKind::parse(val) {
                    Some(kind) => {
                        self.scheduling.strategy = kind;
                        true
                    }
                    None => false,
                },
                "HIVEMIND_WORK_STEALING" => match val.to_lowercase().as_str() {
                    "true" | "1" | "yes" | "on" => {
                        self.work_stealing.enabled = true;
                        true
                    }
                    "false" | "0" | "no" | "off" => {
                        self.work_stealing.enabled = false;
                        true
                    }
                    _ => false,
                },
                _ => continue,
            };

            if applied {
                tracing::info!(variable = %key, value = %val, "Environment override applied");
            } else {
                tracing::warn!(
                    variable = %key,
                    value = %val,
                    "Invalid value for environment override. Ignoring."
                );
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("name", "cannot be empty"));
        }

        if self.mode != SwarmMode::Centralized {
            return Err(ConfigError::invalid(
                "mode",
                format!("{:?} coordination is not supported; use centralized", self.mode),
            ));
        }

        if self.max_agents == 0 {
            return Err(ConfigError::invalid("max_agents", "must be at least 1"));
        }
        if self.max_tasks == 0 {
            return Err(ConfigError::invalid("max_tasks", "must be at least 1"));
        }
        if self.max_duration.is_zero() {
            return Err(ConfigError::invalid("max_duration", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(ConfigError::invalid("quality_threshold", "must be within [0, 1]"));
        }

        if self.monitoring.heartbeat_interval.is_zero() {
            return Err(ConfigError::invalid("monitoring.heartbeat_interval", "must be positive"));
        }
        if self.monitoring.metrics_interval.is_zero() {
            return Err(ConfigError::invalid("monitoring.metrics_interval", "must be positive"));
        }
        if self.monitoring.health_check_interval.is_zero() {
            return Err(ConfigError::invalid(
                "monitoring.health_check_interval",
                "must be positive",
            ));
        }
        if self.monitoring.event_history_limit == 0 {
            return Err(ConfigError::invalid(
                "monitoring.event_history_limit",
                "must be at least 1",
            ));
        }

        if self.performance.max_concurrency == 0 {
            return Err(ConfigError::invalid("performance.max_concurrency", "must be at least 1"));
        }
        if self.performance.default_timeout.is_zero() {
            return Err(ConfigError::invalid("performance.default_timeout", "must be positive"));
        }

        if self.work_stealing.interval.is_zero() {
            return Err(ConfigError::invalid("work_stealing.interval", "must be positive"));
        }
        if !(0.0..1.0).contains(&self.work_stealing.high_water_mark) {
            return Err(ConfigError::invalid(
                "work_stealing.high_water_mark",
                "must be within [0, 1)",
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "circuit_breaker.failure_threshold",
                "must be at least 1",
            ));
        }
        if self.circuit_breaker.window.is_zero() || self.circuit_breaker.cooldown.is_zero() {
            return Err(ConfigError::invalid(
                "circuit_breaker",
                "window and cooldown must be positive",
            ));
        }

        if !(self.conflict.quorum > 0.0 && self.conflict.quorum <= 1.0) {
            return Err(ConfigError::invalid("conflict.quorum", "must be within (0, 1]"));
        }

        for (field, value) in [
            ("resource_limits.memory_mb", self.resource_limits.memory_mb),
            ("resource_limits.cpu_cores", self.resource_limits.cpu_cores),
            ("resource_limits.disk_mb", self.resource_limits.disk_mb),
        ] {
            if value <= 0.0 {
                return Err(ConfigError::invalid(field, "must be positive"));
            }
        }

        Ok(())
    }
}

fn set_parsed<T: std::str::FromStr>(slot: &mut T, raw: &str) -> bool {
    match raw.trim().parse() {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => false,
    }
}

fn set_duration(slot: &mut Duration, raw: &str) -> bool {
    match humantime_serde::re::humantime::parse_duration(raw.trim()) {
        Ok(value) => {
            *slot = value;
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.max_agents, 10);
        assert_eq!(config.max_tasks, 100);
        assert_eq!(config.monitoring.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.performance.shutdown_grace_period, Duration::from_secs(30));
        assert_eq!(config.scheduling.strategy, SchedulingStrategyKind::Capability);
        assert_eq!(config.scheduling.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert!(config.work_stealing.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_with_unknown_keys() {
        let yaml = r#"
name: research-swarm
max_agents: 4
some_future_option: true
monitoring:
  heartbeat_interval: 2s
scheduling:
  strategy: least-loaded
  failure_policy: continue
circuit_breaker:
  cooldown: 1m
"#;
        let config = SwarmConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.name, "research-swarm");
        assert_eq!(config.max_agents, 4);
        assert_eq!(config.monitoring.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.monitoring.metrics_interval, Duration::from_secs(5));
        assert_eq!(config.scheduling.strategy, SchedulingStrategyKind::LeastLoaded);
        assert_eq!(config.scheduling.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.circuit_breaker.cooldown, Duration::from_secs(60));
        assert_eq!(config.circuit_breaker.window, Duration::from_secs(60));
    }

    #[test]
    fn test_json_value() {
        let config = SwarmConfig::from_json_value(serde_json::json!({
            "performance": { "max_concurrency": 2, "default_timeout": "30s" }
        }))
        .unwrap();
        assert_eq!(config.performance.max_concurrency, 2);
        assert_eq!(config.performance.default_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = SwarmConfig::default();
        config.max_agents = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "max_agents", .. })
        ));

        let mut config = SwarmConfig::default();
        config.mode = SwarmMode::Mesh;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.work_stealing.high_water_mark = 1.0;
        assert!(config.validate().is_err());

        let mut config = SwarmConfig::default();
        config.conflict.quorum = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = SwarmConfig::default();
        let vars: HashMap<String, String> = [
            ("HIVEMIND_MAX_AGENTS", "3"),
            ("HIVEMIND_HEARTBEAT_INTERVAL", "250ms"),
            ("HIVEMIND_SCHEDULING_STRATEGY", "round_robin"),
            ("HIVEMIND_WORK_STEALING", "off"),
            ("HIVEMIND_MAX_TASKS", "many"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_overrides(&vars);
        assert_eq!(config.max_agents, 3);
        assert_eq!(config.monitoring.heartbeat_interval, Duration::from_millis(250));
        assert_eq!(config.scheduling.strategy, SchedulingStrategyKind::RoundRobin);
        assert!(!config.work_stealing.enabled);
        assert_eq!(config.max_tasks, 100);
    }
}
