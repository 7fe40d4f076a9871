//! Behavior events broadcast by the persona engine.
//!
//! `BehaviorEvent` is the typed event a behavior loop or the scheduler emits.
//! It is wrapped in an [`EventEnvelope`] (agent identity + timestamp) on the
//! broadcast channel and rendered to the stable wire shape
//! `{"type": ..., "data": {...}, "timestamp": ISO-8601}` by [`EventEnvelope::to_wire`].

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;

use crate::action::ActionKind;
use crate::agent::AgentId;

/// Why a behavior loop is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The persona was deleted or deactivated in the repository.
    CharacterInactive,
    /// `stop()` or `stop_all()` was requested.
    Cancelled,
    /// Setup failed while the loop was initializing.
    InitializationFailed,
    /// The loop outlived the stop grace period and its task was aborted. A
    /// platform call cut off this way has an unknown outcome.
    Aborted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::CharacterInactive => write!(f, "character_inactive"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::InitializationFailed => write!(f, "initialization_failed"),
            StopReason::Aborted => write!(f, "aborted"),
        }
    }
}

/// Events emitted during persona scheduling.
///
/// Serialized adjacently tagged so that the variant name becomes the wire
/// `type` and its fields become `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BehaviorEvent {
    /// A loop task was spawned and registered.
    BehaviorLoopStarted { status: String, task_id: Uuid },

    /// The loop finished setup and is about to tick.
    BehaviorLoopInitialized {},

    BehaviorLoopStopping { reason: StopReason },

    OutsideEngagementHours { current_hour: u32, start: u8, end: u8 },

    /// The loop is idle until its next tick.
    CharacterSleeping { sleep_secs: u64 },

    ActionStarted { action: ActionKind },

    GeneratingTweet {},

    TweetGenerated { content: String },

    PostingTweet { content: String },

    TweetPosted { tweet_id: String, content: String },

    /// Publishing failed. `outcome_unknown` is set when the call was cut off
    /// and may still have succeeded on the platform side.
    TweetError { error: String, outcome_unknown: bool },

    CheckingMentions {},

    MentionsFound { count: usize },

    ReplyPosted {
        reply_id: String,
        in_reply_to: String,
        author_handle: String,
        content: String,
    },

    /// The content gate blocked generated text.
    ContentRejected {
        action: ActionKind,
        issues: Vec<String>,
        suggestions: Vec<String>,
    },

    /// A per-agent rate window is exhausted.
    RateLimited { category: String, action: ActionKind },

    /// The circuit breaker opened after repeated failures.
    AgentPaused {
        consecutive_failures: u32,
        pause_secs: u64,
        last_error: String,
    },

    /// A manual retweet or like finished.
    EngagementPerformed { action: ActionKind, target_id: String },

    /// The loop terminated abnormally and was deregistered.
    CharacterError { error: String },

    /// A tick failed; the loop keeps running.
    Error { error: String },
}

impl BehaviorEvent {
    /// Wire name of the event (the `type` field).
    pub fn event_type(&self) -> &'static str {
        match self {
            BehaviorEvent::BehaviorLoopStarted { .. } => "behavior_loop_started",
            BehaviorEvent::BehaviorLoopInitialized {} => "behavior_loop_initialized",
            BehaviorEvent::BehaviorLoopStopping { .. } => "behavior_loop_stopping",
            BehaviorEvent::OutsideEngagementHours { .. } => "outside_engagement_hours",
            BehaviorEvent::CharacterSleeping { .. } => "character_sleeping",
            BehaviorEvent::ActionStarted { .. } => "action_started",
            BehaviorEvent::GeneratingTweet {} => "generating_tweet",
            BehaviorEvent::TweetGenerated { .. } => "tweet_generated",
            BehaviorEvent::PostingTweet { .. } => "posting_tweet",
            BehaviorEvent::TweetPosted { .. } => "tweet_posted",
            BehaviorEvent::TweetError { .. } => "tweet_error",
            BehaviorEvent::CheckingMentions {} => "checking_mentions",
            BehaviorEvent::MentionsFound { .. } => "mentions_found",
            BehaviorEvent::ReplyPosted { .. } => "reply_posted",
            BehaviorEvent::ContentRejected { .. } => "content_rejected",
            BehaviorEvent::RateLimited { .. } => "rate_limited",
            BehaviorEvent::AgentPaused { .. } => "agent_paused",
            BehaviorEvent::EngagementPerformed { .. } => "engagement_performed",
            BehaviorEvent::CharacterError { .. } => "character_error",
            BehaviorEvent::Error { .. } => "error",
        }
    }
}

/// A behavior event tagged with the persona it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub agent_id: AgentId,
    pub agent_name: String,
    pub event: BehaviorEvent,
    pub timestamp: DateTime<Utc>,
}

impl EventEnvelope {
    pub fn new(agent_id: AgentId, agent_name: impl Into<String>, event: BehaviorEvent) -> Self {
        Self {
            agent_id,
            agent_name: agent_name.into(),
            event,
            timestamp: Utc::now(),
        }
    }

    /// Render the stable outbound shape. The persona identity is injected
    /// into `data` as `character_id` / `character_name`.
    pub fn to_wire(&self) -> WireEvent {
        let mut data = serde_json::to_value(&self.event)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(serde_json::Value::take))
            .and_then(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_default();

        data.insert(
            "character_id".to_string(),
            serde_json::Value::String(self.agent_id.to_string()),
        );
        data.insert(
            "character_name".to_string(),
            serde_json::Value::String(self.agent_name.clone()),
        );

        WireEvent {
            event_type: self.event.event_type().to_string(),
            data: serde_json::Value::Object(data),
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Outbound event format consumed by external observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub timestamp: String,
}
