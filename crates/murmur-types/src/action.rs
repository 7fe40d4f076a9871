//! Action decisions and behavior loop states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::agent::AgentId;

/// What a persona does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Sleep,
    Tweet,
    Reply,
    Retweet,
    Like,
}

impl ActionKind {
    /// Whether the action results in an outbound platform call.
    pub fn is_publish(&self) -> bool {
        !matches!(self, ActionKind::Sleep)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Sleep => write!(f, "sleep"),
            ActionKind::Tweet => write!(f, "tweet"),
            ActionKind::Reply => write!(f, "reply"),
            ActionKind::Retweet => write!(f, "retweet"),
            ActionKind::Like => write!(f, "like"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sleep" => Ok(ActionKind::Sleep),
            "tweet" => Ok(ActionKind::Tweet),
            "reply" => Ok(ActionKind::Reply),
            "retweet" => Ok(ActionKind::Retweet),
            "like" => Ok(ActionKind::Like),
            other => Err(format!("invalid action kind: '{other}'")),
        }
    }
}

/// Output of the action selector. Produced fresh every tick, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub kind: ActionKind,
    pub wait_minutes: u32,
}

impl ActionDecision {
    pub fn new(kind: ActionKind, wait_minutes: u32) -> Self {
        Self { kind, wait_minutes }
    }

    pub fn sleep(wait_minutes: u32) -> Self {
        Self::new(ActionKind::Sleep, wait_minutes)
    }
}

impl fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (wait {} min)", self.kind, self.wait_minutes)
    }
}

/// Lifecycle state of one behavior loop.
///
/// `Initializing` -> {`Sleeping`, `CheckingMentions`, `Tweeting`, `Paused`}
/// -> `Stopping` -> `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Initializing,
    Sleeping,
    CheckingMentions,
    Tweeting,
    /// Circuit breaker open after repeated failures.
    Paused,
    Stopping,
    Stopped,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoopState::Stopped)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Initializing => "initializing",
            LoopState::Sleeping => "sleeping",
            LoopState::CheckingMentions => "checking_mentions",
            LoopState::Tweeting => "tweeting",
            LoopState::Paused => "paused",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Per-loop action counters, kept in memory for the life of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStats {
    pub tweets: u64,
    pub replies: u64,
    pub retweets: u64,
    pub likes: u64,
    /// Generated text blocked by the content gate.
    pub rejections: u64,
    pub rate_limited: u64,
    /// Failed ticks and failed engagements.
    pub errors: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action_at: Option<DateTime<Utc>>,
}

impl ActionStats {
    /// Count a completed outbound action.
    pub fn record_action(&mut self, kind: ActionKind, at: DateTime<Utc>) {
        let counter = match kind {
            ActionKind::Tweet => &mut self.tweets,
            ActionKind::Reply => &mut self.replies,
            ActionKind::Retweet => &mut self.retweets,
            ActionKind::Like => &mut self.likes,
            ActionKind::Sleep => return,
        };
        *counter += 1;
        self.last_action_at = Some(at);
    }

    /// Published tweets and replies.
    pub fn published(&self) -> u64 {
        self.tweets + self.replies
    }
}

/// Snapshot of one registered loop, as returned by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopStatus {
    pub agent_id: AgentId,
    pub state: LoopState,
    /// False once the task has finished but before it deregistered itself.
    pub alive: bool,
    pub started_at: DateTime<Utc>,
    pub stats: ActionStats,
}
