//! Mention deduplication.
//!
//! A mention is answered at most once per persona. The claim is written to
//! the repository first and only committed to the in-memory `replied_ids`
//! after the write is confirmed, so a failed write never hides a mention and
//! a confirmed one is never answered twice.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use murmur_types::agent::{Agent, AgentPatch};
use murmur_types::error::EngineError;
use murmur_types::mention::Mention;

use crate::behavior::timeout::with_timeout;
use crate::repository::character::CharacterRepository;

/// Mentions not yet answered, in the order the platform returned them.
/// Repeated ids within the batch are dropped too.
pub fn filter_new(notifications: Vec<Mention>, replied_ids: &BTreeSet<String>) -> Vec<Mention> {
    let mut seen = HashSet::new();
    notifications
        .into_iter()
        .filter(|m| !replied_ids.contains(&m.tweet_id) && seen.insert(m.tweet_id.clone()))
        .collect()
}

/// Claim `tweet_id` for `agent`: persist, then commit in memory.
///
/// On error the in-memory set is left untouched.
pub async fn mark_replied<R: CharacterRepository>(
    repo: &R,
    agent: &mut Agent,
    tweet_id: &str,
    budget: Duration,
) -> Result<(), EngineError> {
    let patch = AgentPatch::replied_ids(BTreeSet::from([tweet_id.to_string()]));

    let stored = with_timeout("repository.update", budget, repo.update(&agent.id, &patch))
        .await
        .map_err(|e| match e {
            EngineError::Timeout { .. } => {
                EngineError::OutcomeUnknown(format!("claim for mention {tweet_id}: {e}"))
            }
            other => EngineError::Persistence(format!("claim for mention {tweet_id}: {other}")),
        })?;

    let replied = &mut agent.reply_settings.replied_ids;
    replied.extend(stored.reply_settings.replied_ids);
    replied.insert(tweet_id.to_string());
    Ok(())
}
