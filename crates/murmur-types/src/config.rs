//! Engine configuration for murmur.
//!
//! `EngineConfig` is the top-level `config.toml` controlling loop timing,
//! collaborator timeouts, failure backoff, event channel sizing, per-agent
//! rate windows and the content gate. Every field has a default so an empty
//! or partial file is valid.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level engine configuration.
///
/// Loaded from `~/.murmur/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub events: EventsConfig,

    /// Per-agent rate windows keyed by action category.
    #[serde(default = "default_rate_limits")]
    pub rate_limits: BTreeMap<String, RateWindowConfig>,

    #[serde(default)]
    pub gate: GateConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            timeouts: TimeoutConfig::default(),
            backoff: BackoffConfig::default(),
            events: EventsConfig::default(),
            rate_limits: default_rate_limits(),
            gate: GateConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Clamp values that would stall or spin the engine.
    pub fn validate(mut self) -> Self {
        let t = &mut self.timing;
        t.poll_interval_secs = t.poll_interval_secs.max(1);
        t.off_hours_sleep_secs = t.off_hours_sleep_secs.max(1);
        t.mention_check_interval_secs = t.mention_check_interval_secs.max(1);
        t.mention_backlog_interval_secs = t.mention_backlog_interval_secs.max(1);
        t.stop_grace_secs = t.stop_grace_secs.max(1);

        let to = &mut self.timeouts;
        to.repository_secs = to.repository_secs.max(1);
        to.generation_secs = to.generation_secs.max(1);
        to.platform_secs = to.platform_secs.max(1);

        let b = &mut self.backoff;
        b.base_secs = b.base_secs.max(1);
        b.max_secs = b.max_secs.max(b.base_secs);
        b.failure_threshold = b.failure_threshold.max(1);
        b.pause_secs = b.pause_secs.max(1);

        self.events.capacity = self.events.capacity.max(16);

        for window in self.rate_limits.values_mut() {
            window.window_secs = window.window_secs.max(1);
        }
        self
    }
}

/// Loop timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_off_hours_sleep")]
    pub off_hours_sleep_secs: u64,
    #[serde(default = "default_mention_check_interval")]
    pub mention_check_interval_secs: u64,
    /// Re-check delay while unanswered mentions remain.
    #[serde(default = "default_mention_backlog_interval")]
    pub mention_backlog_interval_secs: u64,
    /// How long `start` waits before checking the new task is still alive.
    #[serde(default = "default_start_grace_ms")]
    pub start_grace_ms: u64,
    /// How long `stop` waits for a cooperative exit before aborting.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_off_hours_sleep() -> u64 {
    300
}

fn default_mention_check_interval() -> u64 {
    600
}

fn default_mention_backlog_interval() -> u64 {
    60
}

fn default_start_grace_ms() -> u64 {
    1000
}

fn default_stop_grace() -> u64 {
    60
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn off_hours_sleep(&self) -> Duration {
        Duration::from_secs(self.off_hours_sleep_secs)
    }

    pub fn mention_check_interval(&self) -> Duration {
        Duration::from_secs(self.mention_check_interval_secs)
    }

    pub fn mention_backlog_interval(&self) -> Duration {
        Duration::from_secs(self.mention_backlog_interval_secs)
    }

    pub fn start_grace(&self) -> Duration {
        Duration::from_millis(self.start_grace_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            off_hours_sleep_secs: default_off_hours_sleep(),
            mention_check_interval_secs: default_mention_check_interval(),
            mention_backlog_interval_secs: default_mention_backlog_interval(),
            start_grace_ms: default_start_grace_ms(),
            stop_grace_secs: default_stop_grace(),
        }
    }
}

/// Budgets for external collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_repository_timeout")]
    pub repository_secs: u64,
    #[serde(default = "default_generation_timeout")]
    pub generation_secs: u64,
    #[serde(default = "default_platform_timeout")]
    pub platform_secs: u64,
}

fn default_repository_timeout() -> u64 {
    10
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_platform_timeout() -> u64 {
    30
}

impl TimeoutConfig {
    pub fn repository(&self) -> Duration {
        Duration::from_secs(self.repository_secs)
    }

    pub fn generation(&self) -> Duration {
        Duration::from_secs(self.generation_secs)
    }

    pub fn platform(&self) -> Duration {
        Duration::from_secs(self.platform_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            repository_secs: default_repository_timeout(),
            generation_secs: default_generation_timeout(),
            platform_secs: default_platform_timeout(),
        }
    }
}

/// Escalating error sleep and circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_base")]
    pub base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub max_secs: u64,
    /// Consecutive failed ticks before the agent is paused.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_pause")]
    pub pause_secs: u64,
}

fn default_backoff_base() -> u64 {
    60
}

fn default_backoff_max() -> u64 {
    960
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_pause() -> u64 {
    1800
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: default_backoff_base(),
            max_secs: default_backoff_max(),
            failure_threshold: default_failure_threshold(),
            pause_secs: default_pause(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slow subscribers past this lag.
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// One rate window: at most `max_requests` per `window_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateWindowConfig {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl RateWindowConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Standard fifteen-minute platform window.
pub const RATE_WINDOW_SECS: u64 = 15 * 60;

pub fn default_rate_limits() -> BTreeMap<String, RateWindowConfig> {
    BTreeMap::from([
        ("tweets".to_string(), RateWindowConfig::new(300, RATE_WINDOW_SECS)),
        ("likes".to_string(), RateWindowConfig::new(1000, RATE_WINDOW_SECS)),
        ("follows".to_string(), RateWindowConfig::new(400, RATE_WINDOW_SECS)),
        ("dms".to_string(), RateWindowConfig::new(1000, RATE_WINDOW_SECS)),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Apply the built-in profanity, hate speech and personal info checks.
    #[serde(default = "default_true")]
    pub baseline_patterns: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            baseline_patterns: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.timing.poll_interval_secs, 30);
        assert_eq!(config.timing.off_hours_sleep_secs, 300);
        assert_eq!(config.timing.mention_check_interval_secs, 600);
        assert_eq!(config.timeouts.platform_secs, 30);
        assert_eq!(config.backoff.failure_threshold, 5);
        assert_eq!(config.events.capacity, 1024);
        assert!(config.gate.baseline_patterns);
    }

    #[test]
    fn test_empty_toml_matches_default() {
        let from_toml: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(from_toml.rate_limits.len(), 4);
        assert_eq!(from_toml.rate_limits["tweets"].max_requests, 300);
        assert_eq!(from_toml.rate_limits["likes"].max_requests, 1000);
        assert_eq!(from_toml.rate_limits["follows"].max_requests, 400);
        assert_eq!(from_toml.rate_limits["dms"].window_secs, 900);
        assert_eq!(from_toml, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        let toml_str = r#"
[timing]
poll_interval_secs = 10

[backoff]
failure_threshold = 3

[rate_limits.tweets]
max_requests = 50
window_secs = 3600
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timing.poll_interval_secs, 10);
        assert_eq!(config.timing.off_hours_sleep_secs, 300);
        assert_eq!(config.backoff.failure_threshold, 3);
        assert_eq!(config.backoff.base_secs, 60);
        assert_eq!(config.rate_limits["tweets"], RateWindowConfig::new(50, 3600));
        assert!(!config.rate_limits.contains_key("likes"));
    }

    #[test]
    fn test_validate_clamps_zeroes() {
        let mut config = EngineConfig::default();
        config.timing.poll_interval_secs = 0;
        config.backoff.failure_threshold = 0;
        config.backoff.base_secs = 100;
        config.backoff.max_secs = 10;
        config.events.capacity = 0;

        let config = config.validate();
        assert_eq!(config.timing.poll_interval_secs, 1);
        assert_eq!(config.backoff.failure_threshold, 1);
        assert_eq!(config.backoff.max_secs, 100);
        assert_eq!(config.events.capacity, 16);
    }

    #[test]
    fn test_duration_helpers() {
        let timing = TimingConfig::default();
        assert_eq!(timing.poll_interval(), Duration::from_secs(30));
        assert_eq!(timing.start_grace(), Duration::from_millis(1000));
    }
}
