//! Per-agent rate windows.
//!
//! Each agent owns its own `RateLimiter`, so nothing here is shared across
//! loops. `check_limit` must precede `use_limit`; the loop's publish path is
//! strictly sequential so no atomic check-and-decrement is needed.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, TimeZone, Utc};

use murmur_types::action::ActionKind;
use murmur_types::config::{RateWindowConfig, default_rate_limits};

pub const TWEETS: &str = "tweets";
pub const LIKES: &str = "likes";
pub const FOLLOWS: &str = "follows";
pub const DMS: &str = "dms";

const MAX_WINDOW_SECS: i64 = 366 * 24 * 3600;

/// Rate category consumed by an action, if any.
pub fn category_for(action: ActionKind) -> Option<&'static str> {
    match action {
        ActionKind::Tweet | ActionKind::Reply | ActionKind::Retweet => Some(TWEETS),
        ActionKind::Like => Some(LIKES),
        ActionKind::Sleep => None,
    }
}

/// One fixed window for one action category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitWindow {
    pub category: String,
    pub window: Duration,
    pub max_requests: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitWindow {
    fn new(category: &str, config: RateWindowConfig, now: DateTime<Utc>) -> Self {
        let secs = i64::try_from(config.window_secs)
            .unwrap_or(MAX_WINDOW_SECS)
            .min(MAX_WINDOW_SECS);
        let window = Duration::seconds(secs);
        Self {
            category: category.to_string(),
            window,
            max_requests: config.max_requests,
            remaining: config.max_requests,
            reset_at: now + window,
        }
    }

    fn refresh(&mut self, now: DateTime<Utc>) {
        if now >= self.reset_at {
            self.remaining = self.max_requests;
            self.reset_at = now + self.window;
        }
    }
}

/// Request budgets for one agent.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: HashMap<String, RateLimitWindow>,
}

impl RateLimiter {
    pub fn new(limits: &BTreeMap<String, RateWindowConfig>) -> Self {
        Self::new_at(limits, Utc::now())
    }

    pub fn new_at(limits: &BTreeMap<String, RateWindowConfig>, now: DateTime<Utc>) -> Self {
        let windows = limits
            .iter()
            .map(|(category, config)| {
                (category.clone(), RateLimitWindow::new(category, *config, now))
            })
            .collect();
        Self { windows }
    }

    /// Platform default windows.
    pub fn with_defaults() -> Self {
        Self::new(&default_rate_limits())
    }

    /// Whether one more request of `category` fits in the current window.
    /// Categories without a configured window are always allowed.
    pub fn check_limit(&mut self, category: &str) -> bool {
        self.check_limit_at(category, Utc::now())
    }

    pub fn check_limit_at(&mut self, category: &str, now: DateTime<Utc>) -> bool {
        match self.windows.get_mut(category) {
            Some(window) => {
                window.refresh(now);
                window.remaining > 0
            }
            None => true,
        }
    }

    /// Consume one request. Never goes below zero.
    pub fn use_limit(&mut self, category: &str) {
        if let Some(window) = self.windows.get_mut(category) {
            window.remaining = window.remaining.saturating_sub(1);
        }
    }

    /// Reconcile with authoritative platform values.
    ///
    /// Understands `{category}-x-rate-limit-remaining` and
    /// `{category}-x-rate-limit-reset` (unix seconds). Unparseable values and
    /// unknown categories are ignored.
    pub fn update_limits(&mut self, headers: &HashMap<String, String>) {
        for (category, window) in self.windows.iter_mut() {
            let remaining_key = format!("{category}-x-rate-limit-remaining");
            if let Some(remaining) = headers
                .get(&remaining_key)
                .and_then(|v| v.trim().parse::<u32>().ok())
            {
                window.remaining = remaining.min(window.max_requests);
            }

            let reset_key = format!("{category}-x-rate-limit-reset");
            if let Some(reset_at) = headers
                .get(&reset_key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            {
                window.reset_at = reset_at;
            }
        }
    }

    pub fn remaining(&self, category: &str) -> Option<u32> {
        self.windows.get(category).map(|w| w.remaining)
    }

    pub fn window(&self, category: &str) -> Option<&RateLimitWindow> {
        self.windows.get(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn exhausts_after_max_then_resets() {
        let now = start();
        let mut limiter = RateLimiter::new_at(&default_rate_limits(), now);

        for _ in 0..300 {
            assert!(limiter.check_limit_at(TWEETS, now));
            limiter.use_limit(TWEETS);
        }
        assert!(!limiter.check_limit_at(TWEETS, now));
        assert!(!limiter.check_limit_at(TWEETS, now + Duration::minutes(14)));

        let after = now + Duration::minutes(15);
        assert!(limiter.check_limit_at(TWEETS, after));
        assert_eq!(limiter.remaining(TWEETS), Some(300));
        assert_eq!(limiter.window(TWEETS).unwrap().reset_at, after + Duration::minutes(15));
    }

    #[test]
    fn check_does_not_consume() {
        let now = start();
        let mut limiter = RateLimiter::new_at(&default_rate_limits(), now);
        for _ in 0..10 {
            limiter.check_limit_at(LIKES, now);
        }
        assert_eq!(limiter.remaining(LIKES), Some(1000));
    }

    #[test]
    fn remaining_never_negative() {
        let limits = BTreeMap::from([(DMS.to_string(), RateWindowConfig::new(1, 60))]);
        let mut limiter = RateLimiter::new_at(&limits, start());
        limiter.use_limit(DMS);
        limiter.use_limit(DMS);
        assert_eq!(limiter.remaining(DMS), Some(0));
    }

    #[test]
    fn unknown_category_is_allowed() {
        let mut limiter = RateLimiter::with_defaults();
        assert!(limiter.check_limit("polls"));
        limiter.use_limit("polls");
        assert_eq!(limiter.remaining("polls"), None);
    }

    #[test]
    fn windows_are_independent() {
        let now = start();
        let mut limiter = RateLimiter::new_at(&default_rate_limits(), now);
        limiter.use_limit(TWEETS);
        assert_eq!(limiter.remaining(TWEETS), Some(299));
        assert_eq!(limiter.remaining(FOLLOWS), Some(400));
    }

    #[test]
    fn update_limits_reads_platform_headers() {
        let now = start();
        let mut limiter = RateLimiter::new_at(&default_rate_limits(), now);
        let reset = now + Duration::minutes(3);
        let headers = HashMap::from([
            ("tweets-x-rate-limit-remaining".to_string(), "0".to_string()),
            ("tweets-x-rate-limit-reset".to_string(), reset.timestamp().to_string()),
            ("likes-x-rate-limit-remaining".to_string(), "garbage".to_string()),
        ]);

        limiter.update_limits(&headers);

        assert_eq!(limiter.remaining(TWEETS), Some(0));
        assert!(!limiter.check_limit_at(TWEETS, now + Duration::minutes(1)));
        assert!(limiter.check_limit_at(TWEETS, reset));
        assert_eq!(limiter.remaining(LIKES), Some(1000));
    }

    #[test]
    fn category_mapping() {
        assert_eq!(category_for(ActionKind::Reply), Some(TWEETS));
        assert_eq!(category_for(ActionKind::Retweet), Some(TWEETS));
        assert_eq!(category_for(ActionKind::Like), Some(LIKES));
        assert_eq!(category_for(ActionKind::Sleep), None);
    }
}
