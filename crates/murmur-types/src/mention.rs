//! Inbound mentions and outbound publish receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A post on the platform that mentions a persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub tweet_id: String,
    pub author_handle: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Identifier returned by the platform for a published post or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub id: String,
}

impl PublishReceipt {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
