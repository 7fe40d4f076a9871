//! Per-agent failure backoff and circuit breaker.
//!
//! Failed ticks sleep `base`, `2*base`, `4*base`... capped at `max`. Once
//! `failure_threshold` consecutive ticks have failed the circuit opens and the
//! agent is paused for `pause`. The first tick after the pause is a trial: a
//! success closes the circuit, a failure reopens it immediately.

use std::time::Duration;

use tokio::time::Instant;

use murmur_types::config::BackoffConfig;

/// Circuit breaker state for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation. Tracks consecutive failures toward the threshold.
    Closed { consecutive_failures: u32 },
    /// Agent is paused until `wait_duration` has elapsed.
    Open {
        opened_at: Instant,
        wait_duration: Duration,
    },
    /// Pause elapsed; the next tick decides.
    HalfOpen,
}

/// What the loop should do after a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Sleep `delay` and try again.
    Retry {
        delay: Duration,
        consecutive_failures: u32,
    },
    /// Circuit opened: pause the agent for `duration`.
    Pause {
        duration: Duration,
        consecutive_failures: u32,
    },
}

#[derive(Debug, Clone)]
pub struct FailureBackoff {
    state: CircuitState,
    base: Duration,
    max: Duration,
    failure_threshold: u32,
    pause: Duration,
    /// Failures since the last successful tick, across pauses.
    total_streak: u32,
}

impl FailureBackoff {
    pub fn new(config: &BackoffConfig) -> Self {
        Self {
            state: CircuitState::Closed {
                consecutive_failures: 0,
            },
            base: Duration::from_secs(config.base_secs),
            max: Duration::from_secs(config.max_secs.max(config.base_secs)),
            failure_threshold: config.failure_threshold.max(1),
            pause: Duration::from_secs(config.pause_secs),
            total_streak: 0,
        }
    }

    pub fn state(&self) -> &CircuitState {
        &self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.total_streak
    }

    /// Move an elapsed `Open` circuit to `HalfOpen`. Returns whether a tick
    /// may run now.
    pub fn poll(&mut self) -> bool {
        match &self.state {
            CircuitState::Open {
                opened_at,
                wait_duration,
            } => {
                if opened_at.elapsed() >= *wait_duration {
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
            CircuitState::Closed { .. } | CircuitState::HalfOpen => true,
        }
    }

    /// Remaining pause, if the circuit is open.
    pub fn remaining_pause(&self) -> Option<Duration> {
        match &self.state {
            CircuitState::Open {
                opened_at,
                wait_duration,
            } => Some(wait_duration.saturating_sub(opened_at.elapsed())),
            _ => None,
        }
    }

    pub fn record_success(&mut self) {
        if self.total_streak > 0 {
            tracing::info!(failures = self.total_streak, "agent recovered");
        }
        self.state = CircuitState::Closed {
            consecutive_failures: 0,
        };
        self.total_streak = 0;
    }

    pub fn record_failure(&mut self) -> FailureAction {
        self.total_streak = self.total_streak.saturating_add(1);

        match &self.state {
            CircuitState::Closed {
                consecutive_failures,
            } => {
                let count = consecutive_failures + 1;
                if count >= self.failure_threshold {
                    self.open()
                } else {
                    self.state = CircuitState::Closed {
                        consecutive_failures: count,
                    };
                    FailureAction::Retry {
                        delay: self.delay_for(count),
                        consecutive_failures: self.total_streak,
                    }
                }
            }
            // Trial tick failed, reopen the circuit
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open { .. } => FailureAction::Pause {
                duration: self.remaining_pause().unwrap_or(self.pause),
                consecutive_failures: self.total_streak,
            },
        }
    }

    fn open(&mut self) -> FailureAction {
        self.state = CircuitState::Open {
            opened_at: Instant::now(),
            wait_duration: self.pause,
        };
        FailureAction::Pause {
            duration: self.pause,
            consecutive_failures: self.total_streak,
        }
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }
}
