//! In-memory fakes of the collaborator traits for engine tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;

use murmur_types::agent::{Agent, AgentId, AgentPatch};
use murmur_types::error::{GenerationError, PlatformError, RepositoryError};
use murmur_types::mention::{Mention, PublishReceipt};

use crate::generator::{ContentGenerator, TweetContext};
use crate::platform::{PlatformConnector, SocialPlatformClient};
use crate::repository::character::{AgentFilter, CharacterRepository};

pub fn mention(id: &str) -> Mention {
    Mention {
        tweet_id: id.to_string(),
        author_handle: "@fan".to_string(),
        text: format!("hello from {id}"),
        timestamp: Utc::now(),
    }
}

/// `DashMap`-backed repository.
#[derive(Default)]
pub struct MemoryRepo {
    agents: DashMap<AgentId, Agent>,
    fail_updates: AtomicBool,
}

impl MemoryRepo {
    pub fn with(agent: Agent) -> Self {
        let repo = Self::default();
        repo.agents.insert(agent.id.clone(), agent);
        repo
    }

    pub fn insert(&self, agent: Agent) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn get_sync(&self, id: &AgentId) -> Agent {
        self.agents.get(id).map(|a| a.clone()).unwrap()
    }

    pub fn patch(&self, id: &AgentId, patch: &AgentPatch) {
        if let Some(mut agent) = self.agents.get_mut(id) {
            patch.apply(&mut agent);
        }
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }
}

impl CharacterRepository for MemoryRepo {
    async fn create(&self, agent: &Agent) -> Result<Agent, RepositoryError> {
        self.agents.insert(agent.id.clone(), agent.clone());
        Ok(agent.clone())
    }

    async fn get(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.get(id).map(|a| a.clone()))
    }

    async fn list(&self, filter: Option<AgentFilter>) -> Result<Vec<Agent>, RepositoryError> {
        let active = filter.and_then(|f| f.active);
        Ok(self
            .agents
            .iter()
            .filter(|a| active.is_none_or(|want| a.active == want))
            .map(|a| a.clone())
            .collect())
    }

    async fn update(&self, id: &AgentId, patch: &AgentPatch) -> Result<Agent, RepositoryError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("database is locked".into()));
        }
        let mut agent = self.agents.get_mut(id).ok_or(RepositoryError::NotFound)?;
        patch.apply(&mut agent);
        Ok(agent.clone())
    }
}

/// Everything the fake platform was asked to do.
#[derive(Default)]
pub struct PlatformLog {
    published: Mutex<Vec<String>>,
    replies: Mutex<Vec<(String, String)>>,
    likes: Mutex<Vec<String>>,
    retweets: Mutex<Vec<String>>,
    mentions: Mutex<Vec<Mention>>,
    publish_attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Duration>,
    hang_publish: AtomicBool,
}

impl PlatformLog {
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }

    pub fn likes(&self) -> Vec<String> {
        self.likes.lock().unwrap().clone()
    }

    pub fn retweets(&self) -> Vec<String> {
        self.retweets.lock().unwrap().clone()
    }

    pub fn publish_attempts(&self) -> usize {
        self.publish_attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_mentions(&self, mentions: Vec<Mention>) {
        *self.mentions.lock().unwrap() = mentions;
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn hang_publish(&self, hang: bool) {
        self.hang_publish.store(hang, Ordering::SeqCst);
    }

    async fn outbound<T>(&self, record: impl FnOnce() -> T) -> T {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let out = record();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

pub struct FakeClient {
    log: Arc<PlatformLog>,
}

impl SocialPlatformClient for FakeClient {
    async fn publish(&self, text: &str) -> Result<PublishReceipt, PlatformError> {
        self.log.publish_attempts.fetch_add(1, Ordering::SeqCst);
        if self.log.hang_publish.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let receipt = self
            .log
            .outbound(|| {
                let mut published = self.log.published.lock().unwrap();
                published.push(text.to_string());
                PublishReceipt::new(format!("t{}", published.len()))
            })
            .await;
        Ok(receipt)
    }

    async fn reply(&self, text: &str, target_id: &str) -> Result<PublishReceipt, PlatformError> {
        let receipt = self
            .log
            .outbound(|| {
                let mut replies = self.log.replies.lock().unwrap();
                replies.push((text.to_string(), target_id.to_string()));
                PublishReceipt::new(format!("r{}", replies.len()))
            })
            .await;
        Ok(receipt)
    }

    async fn retweet(&self, target_id: &str) -> Result<(), PlatformError> {
        self.log
            .outbound(|| self.log.retweets.lock().unwrap().push(target_id.to_string()))
            .await;
        Ok(())
    }

    async fn like(&self, target_id: &str) -> Result<(), PlatformError> {
        self.log
            .outbound(|| self.log.likes.lock().unwrap().push(target_id.to_string()))
            .await;
        Ok(())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Mention>, PlatformError> {
        Ok(self.log.mentions.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct FakeConnector {
    log: Arc<PlatformLog>,
    fail_auth: bool,
}

impl FakeConnector {
    pub fn failing_auth() -> Self {
        Self {
            fail_auth: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Arc<PlatformLog> {
        Arc::clone(&self.log)
    }
}

impl PlatformConnector for FakeConnector {
    type Client = FakeClient;

    async fn connect(&self, _agent: &Agent) -> Result<FakeClient, PlatformError> {
        if self.fail_auth {
            return Err(PlatformError::Auth("credentials revoked".into()));
        }
        Ok(FakeClient {
            log: Arc::clone(&self.log),
        })
    }
}

/// Generator returning canned text and recording contexts.
#[derive(Default)]
pub struct ScriptedGenerator {
    tweet_text: Mutex<Option<String>>,
    contexts: Mutex<Vec<TweetContext>>,
    reply_calls: AtomicUsize,
    fail: AtomicBool,
}

impl ScriptedGenerator {
    pub fn set_tweet_text(&self, text: &str) {
        *self.tweet_text.lock().unwrap() = Some(text.to_string());
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn tweet_contexts(&self) -> Vec<TweetContext> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn reply_calls(&self) -> usize {
        self.reply_calls.load(Ordering::SeqCst)
    }
}

impl ContentGenerator for ScriptedGenerator {
    async fn generate_tweet(
        &self,
        agent: &Agent,
        context: &TweetContext,
    ) -> Result<String, GenerationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError("model unavailable".into()));
        }
        let mut contexts = self.contexts.lock().unwrap();
        contexts.push(context.clone());
        let text = self.tweet_text.lock().unwrap().clone();
        Ok(text.unwrap_or_else(|| format!("{} thought #{}", agent.name, contexts.len())))
    }

    async fn generate_reply(
        &self,
        _agent: &Agent,
        source_text: &str,
        _author_handle: &str,
    ) -> Result<String, GenerationError> {
        self.reply_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError("model unavailable".into()));
        }
        Ok(format!("re: {source_text}"))
    }
}
