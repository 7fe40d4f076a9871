//! Dry-run platform adapter.
//!
//! Every outbound call is logged and receipted locally. No mentions ever
//! arrive, so a dry-run persona only exercises the posting path.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use murmur_core::platform::{PlatformConnector, SocialPlatformClient};
use murmur_types::agent::{Agent, AgentId};
use murmur_types::error::PlatformError;
use murmur_types::mention::{Mention, PublishReceipt};

/// What a dry-run client would have sent, per persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Post { id: String, text: String },
    Reply { id: String, text: String, target_id: String },
    Retweet { target_id: String },
    Like { target_id: String },
}

/// Connector handing out [`DryRunClient`]s that share one outbox.
#[derive(Default, Clone)]
pub struct DryRunConnector {
    outbox: Arc<DashMap<AgentId, Vec<Outbound>>>,
}

impl DryRunConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything the persona has sent so far, oldest first.
    pub fn sent(&self, agent_id: &AgentId) -> Vec<Outbound> {
        self.outbox
            .get(agent_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl PlatformConnector for DryRunConnector {
    type Client = DryRunClient;

    async fn connect(&self, agent: &Agent) -> Result<DryRunClient, PlatformError> {
        tracing::info!(agent_id = %agent.id, name = %agent.name, "dry-run platform client connected");
        Ok(DryRunClient {
            agent_id: agent.id.clone(),
            outbox: Arc::clone(&self.outbox),
        })
    }
}

pub struct DryRunClient {
    agent_id: AgentId,
    outbox: Arc<DashMap<AgentId, Vec<Outbound>>>,
}

impl DryRunClient {
    fn record(&self, entry: Outbound) {
        self.outbox
            .entry(self.agent_id.clone())
            .or_default()
            .push(entry);
    }
}

fn receipt_id() -> String {
    format!("dry-{}", Uuid::now_v7())
}

impl SocialPlatformClient for DryRunClient {
    async fn publish(&self, text: &str) -> Result<PublishReceipt, PlatformError> {
        let id = receipt_id();
        tracing::info!(agent_id = %self.agent_id, post_id = %id, text, "dry run: publish");
        self.record(Outbound::Post {
            id: id.clone(),
            text: text.to_string(),
        });
        Ok(PublishReceipt::new(id))
    }

    async fn reply(&self, text: &str, target_id: &str) -> Result<PublishReceipt, PlatformError> {
        let id = receipt_id();
        tracing::info!(agent_id = %self.agent_id, post_id = %id, target_id, text, "dry run: reply");
        self.record(Outbound::Reply {
            id: id.clone(),
            text: text.to_string(),
            target_id: target_id.to_string(),
        });
        Ok(PublishReceipt::new(id))
    }

    async fn retweet(&self, target_id: &str) -> Result<(), PlatformError> {
        tracing::info!(agent_id = %self.agent_id, target_id, "dry run: retweet");
        self.record(Outbound::Retweet {
            target_id: target_id.to_string(),
        });
        Ok(())
    }

    async fn like(&self, target_id: &str) -> Result<(), PlatformError> {
        tracing::info!(agent_id = %self.agent_id, target_id, "dry run: like");
        self.record(Outbound::Like {
            target_id: target_id.to_string(),
        });
        Ok(())
    }

    async fn fetch_notifications(&self) -> Result<Vec<Mention>, PlatformError> {
        Ok(Vec::new())
    }
}
