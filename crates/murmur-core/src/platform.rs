//! Social platform client traits.
//!
//! A `PlatformConnector` turns a persona into an authenticated
//! `SocialPlatformClient`. The behavior loop owns exactly one client and never
//! issues two calls on it at the same time.

use std::collections::HashMap;

use murmur_types::agent::Agent;
use murmur_types::error::PlatformError;
use murmur_types::mention::{Mention, PublishReceipt};

/// Per-persona platform client.
pub trait SocialPlatformClient: Send + Sync + 'static {
    /// Publish a new post.
    fn publish(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<PublishReceipt, PlatformError>> + Send;

    /// Reply to an existing post.
    fn reply(
        &self,
        text: &str,
        target_id: &str,
    ) -> impl std::future::Future<Output = Result<PublishReceipt, PlatformError>> + Send;

    fn retweet(
        &self,
        target_id: &str,
    ) -> impl std::future::Future<Output = Result<(), PlatformError>> + Send;

    fn like(
        &self,
        target_id: &str,
    ) -> impl std::future::Future<Output = Result<(), PlatformError>> + Send;

    /// Recent mentions of the persona, oldest first.
    fn fetch_notifications(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Mention>, PlatformError>> + Send;

    /// Rate limit headers observed on the most recent call, in the
    /// `{category}-x-rate-limit-remaining` / `-reset` form.
    fn rate_limit_headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Builds a persona's platform client from its stored credentials.
///
/// A `PlatformError::Auth` here means the persona cannot run at all.
pub trait PlatformConnector: Send + Sync + 'static {
    type Client: SocialPlatformClient;

    fn connect(
        &self,
        agent: &Agent,
    ) -> impl std::future::Future<Output = Result<Self::Client, PlatformError>> + Send;
}
