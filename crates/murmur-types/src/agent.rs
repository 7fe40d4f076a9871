use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a persona, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new AgentId using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create an AgentId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// An automated social-media persona.
///
/// Owned by the character repository. The behavior engine re-reads it at the
/// top of every tick and only ever writes back deltas through [`AgentPatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Display name used in logs and events.
    pub name: String,
    /// Inactive personas stop their behavior loop at the next tick.
    pub active: bool,
    pub engagement_hours: EngagementHours,
    pub tweet_settings: TweetSettings,
    pub reply_settings: ReplySettings,
    /// Topic tags handed to the content generator.
    pub content_focus: Vec<String>,
    pub persona: PersonaProfile,
    pub ethics: EthicalFramework,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Build a fresh, active agent with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name: name.into(),
            active: true,
            engagement_hours: EngagementHours::default(),
            tweet_settings: TweetSettings::default(),
            reply_settings: ReplySettings::default(),
            content_focus: Vec::new(),
            persona: PersonaProfile::default(),
            ethics: EthicalFramework::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this agent's tweet id has already been answered.
    pub fn has_replied_to(&self, tweet_id: &str) -> bool {
        self.reply_settings.replied_ids.contains(tweet_id)
    }
}

/// Inclusive hour-of-day window (UTC) during which a persona may act.
///
/// `start == end` means a single active hour. `start > end` is not supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementHours {
    pub start: u8,
    pub end: u8,
}

impl EngagementHours {
    pub fn new(start: u8, end: u8) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, hour: u32) -> bool {
        u32::from(self.start) <= hour && hour <= u32::from(self.end)
    }

    /// Check the window is well formed (`start <= end <= 23`).
    pub fn validate(&self) -> Result<(), String> {
        if self.end > 23 {
            return Err(format!("engagement end hour {} is out of range 0-23", self.end));
        }
        if self.start > self.end {
            return Err(format!(
                "engagement start hour {} is after end hour {}",
                self.start, self.end
            ));
        }
        Ok(())
    }
}

impl Default for EngagementHours {
    fn default() -> Self {
        Self { start: 0, end: 23 }
    }
}

/// Small tolerance so reciprocal rates like 1/30 floor to 30, not 29.
const INTERVAL_EPSILON: f64 = 1e-9;

/// Scheduled posting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweetSettings {
    pub enabled: bool,
    /// Target posting rate. `1/30` means one post every thirty minutes.
    pub posts_per_minute: f64,
}

impl TweetSettings {
    /// Minutes between scheduled posts, or `None` when posting is off.
    ///
    /// `floor(1 / posts_per_minute)`, never below one minute. A rate that is
    /// zero, negative or not finite disables posting.
    pub fn interval_minutes(&self) -> Option<u32> {
        if !self.enabled || !self.posts_per_minute.is_finite() || self.posts_per_minute <= 0.0 {
            return None;
        }
        let raw = (1.0 / self.posts_per_minute + INTERVAL_EPSILON).floor();
        let minutes = if raw >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            raw as u32
        };
        Some(minutes.max(1))
    }
}

impl Default for TweetSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            posts_per_minute: 1.0 / 60.0,
        }
    }
}

/// Mention reply configuration and the append-only set of answered mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplySettings {
    pub enabled: bool,
    pub reply_to_mentions: bool,
    /// Tweet ids this persona has claimed a reply for. Never shrinks.
    pub replied_ids: BTreeSet<String>,
}

impl ReplySettings {
    /// Mentions are only polled when both switches are on.
    pub fn wants_mentions(&self) -> bool {
        self.enabled && self.reply_to_mentions
    }
}

/// Voice of the persona, passed through to the content generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaProfile {
    pub bio: String,
    pub tone: String,
    pub key_traits: Vec<String>,
}

/// How the content gate treats a sensitive topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicHandling {
    /// Mentioning the topic blocks publication.
    Avoid,
    /// Mentioning the topic is logged as a warning but allowed.
    Careful,
}

impl fmt::Display for TopicHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicHandling::Avoid => write!(f, "avoid"),
            TopicHandling::Careful => write!(f, "careful"),
        }
    }
}

impl FromStr for TopicHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avoid" => Ok(TopicHandling::Avoid),
            "careful" => Ok(TopicHandling::Careful),
            other => Err(format!("invalid topic handling: '{other}'")),
        }
    }
}

/// Per-persona content policy evaluated before anything is published.
///
/// Every entry is a case-insensitive pattern (regular expression, or a
/// literal phrase when it is not a valid expression).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EthicalFramework {
    pub ethical_boundaries: Vec<String>,
    pub content_restrictions: Vec<String>,
    pub sensitive_topics: BTreeMap<String, TopicHandling>,
}

/// Partial update persisted through the character repository.
///
/// `replied_ids` is merged as a set union by every implementation so the
/// stored set can only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentPatch {
    pub active: Option<bool>,
    pub replied_ids: Option<BTreeSet<String>>,
}

impl AgentPatch {
    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    pub fn replied_ids(ids: BTreeSet<String>) -> Self {
        Self {
            replied_ids: Some(ids),
            ..Self::default()
        }
    }

    /// Apply the patch to an in-memory agent.
    pub fn apply(&self, agent: &mut Agent) {
        if let Some(active) = self.active {
            agent.active = active;
        }
        if let Some(ids) = &self.replied_ids {
            agent
                .reply_settings
                .replied_ids
                .extend(ids.iter().cloned());
        }
        agent.updated_at = Utc::now();
    }
}

/// Import format for creating a persona (id and timestamps are assigned).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub engagement_hours: EngagementHours,
    #[serde(default)]
    pub tweet_settings: TweetSettings,
    #[serde(default)]
    pub reply_settings: ReplySettings,
    #[serde(default)]
    pub content_focus: Vec<String>,
    #[serde(default)]
    pub persona: PersonaProfile,
    #[serde(default)]
    pub ethics: EthicalFramework,
}

fn default_active() -> bool {
    true
}

impl NewAgent {
    /// Validate and turn the draft into a stored agent.
    pub fn into_agent(self) -> Result<Agent, String> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err("name cannot be empty".to_string());
        }
        self.engagement_hours.validate()?;

        let mut agent = Agent::new(name);
        agent.active = self.active;
        agent.engagement_hours = self.engagement_hours;
        agent.tweet_settings = self.tweet_settings;
        agent.reply_settings = self.reply_settings;
        agent.content_focus = self.content_focus;
        agent.persona = self.persona;
        agent.ethics = self.ethics;
        Ok(agent)
    }
}
