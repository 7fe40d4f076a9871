//! Next-action selection.
//!
//! Everything here is a pure function of the agent, the clock and the loop's
//! own schedule bookkeeping. No I/O: fetching mentions belongs to the loop.
//!
//! [`determine_next_action`] answers "what is the single most important thing
//! to do now" and backs the `decide` command. The behavior loop runs
//! [`plan_tick`] instead, which shares the same engagement-window and tweet
//! interval rules but keeps the mention and tweet timers independent so both
//! can fire in one tick.

use chrono::{DateTime, Duration, Timelike, Utc};

use murmur_types::action::{ActionDecision, ActionKind};
use murmur_types::agent::Agent;
use murmur_types::config::TimingConfig;

/// Wait when the agent is outside its engagement window.
pub const OFF_HOURS_WAIT_MINUTES: u32 = 60;
/// Wait when nothing is enabled.
pub const IDLE_WAIT_MINUTES: u32 = 30;
/// Wait reported when replies take priority.
pub const REPLY_WAIT_MINUTES: u32 = 1;

/// Timers the loop keeps between ticks. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleState {
    pub last_tweet_at: Option<DateTime<Utc>>,
    pub last_mention_check_at: Option<DateTime<Utc>>,
    /// Unanswered mentions remained after the last check.
    pub mention_backlog: bool,
}

/// What the loop should do on this tick. Mentions run before the tweet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickPlan {
    pub mentions_due: bool,
    pub tweet_due: bool,
}

/// Whether `now` falls inside the agent's engagement hours (UTC, inclusive).
pub fn within_engagement_hours(agent: &Agent, now: DateTime<Utc>) -> bool {
    agent.engagement_hours.contains(now.hour())
}

/// Decide the agent's highest-priority action.
///
/// Priority: off-hours sleep, then mention replies, then the scheduled tweet,
/// then idle.
pub fn determine_next_action(
    agent: &Agent,
    now: DateTime<Utc>,
    schedule: &ScheduleState,
) -> ActionDecision {
    if !within_engagement_hours(agent, now) {
        return ActionDecision::sleep(OFF_HOURS_WAIT_MINUTES);
    }

    if agent.reply_settings.wants_mentions() {
        return ActionDecision::new(ActionKind::Reply, REPLY_WAIT_MINUTES);
    }

    if let Some(interval) = agent.tweet_settings.interval_minutes() {
        return match minutes_until_tweet(interval, now, schedule.last_tweet_at) {
            0 => ActionDecision::new(ActionKind::Tweet, interval),
            remaining => ActionDecision::sleep(remaining),
        };
    }

    ActionDecision::sleep(IDLE_WAIT_MINUTES)
}

/// Work due on this tick. Mention checks and the tweet timer are independent
/// and may both fire.
pub fn plan_tick(
    agent: &Agent,
    now: DateTime<Utc>,
    schedule: &ScheduleState,
    timing: &TimingConfig,
) -> TickPlan {
    let mentions_due = agent.reply_settings.wants_mentions()
        && match schedule.last_mention_check_at {
            None => true,
            Some(last) => {
                let interval = if schedule.mention_backlog {
                    timing.mention_backlog_interval_secs
                } else {
                    timing.mention_check_interval_secs
                };
                elapsed_secs(last, now) >= interval as i64
            }
        };

    let tweet_due = agent
        .tweet_settings
        .interval_minutes()
        .is_some_and(|interval| minutes_until_tweet(interval, now, schedule.last_tweet_at) == 0);

    TickPlan {
        mentions_due,
        tweet_due,
    }
}

/// Whole minutes (rounded up) until the next tweet is due; zero when due.
fn minutes_until_tweet(
    interval_minutes: u32,
    now: DateTime<Utc>,
    last_tweet_at: Option<DateTime<Utc>>,
) -> u32 {
    let Some(last) = last_tweet_at else {
        return 0;
    };
    let interval_secs = i64::from(interval_minutes) * 60;
    let remaining_secs = interval_secs - elapsed_secs(last, now);
    if remaining_secs <= 0 {
        return 0;
    }
    let minutes = (remaining_secs + 59) / 60;
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).max(Duration::zero()).num_seconds()
}
