//! Content generator trait.

use chrono::{DateTime, Utc};

use murmur_types::agent::Agent;
use murmur_types::error::GenerationError;

/// Recently published texts kept as context for the next post.
pub const RECENT_TWEETS_LIMIT: usize = 5;

/// Context handed to the generator for a scheduled post.
#[derive(Debug, Clone)]
pub struct TweetContext {
    pub content_focus: Vec<String>,
    pub now: DateTime<Utc>,
    /// Most recent first, at most [`RECENT_TWEETS_LIMIT`] entries.
    pub recent_tweets: Vec<String>,
}

/// Produces post and reply text for a persona. Treated as opaque.
pub trait ContentGenerator: Send + Sync + 'static {
    fn generate_tweet(
        &self,
        agent: &Agent,
        context: &TweetContext,
    ) -> impl std::future::Future<Output = Result<String, GenerationError>> + Send;

    fn generate_reply(
        &self,
        agent: &Agent,
        source_text: &str,
        author_handle: &str,
    ) -> impl std::future::Future<Output = Result<String, GenerationError>> + Send;
}
