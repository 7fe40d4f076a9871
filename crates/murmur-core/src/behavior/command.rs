//! Commands delivered into a running behavior loop.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use murmur_types::action::ActionKind;
use murmur_types::error::EngineError;

/// Manual engagement actions a loop can perform between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementKind {
    Retweet,
    Like,
}

impl EngagementKind {
    pub fn action(&self) -> ActionKind {
        match self {
            EngagementKind::Retweet => ActionKind::Retweet,
            EngagementKind::Like => ActionKind::Like,
        }
    }
}

/// Reply channel for a loop command.
pub type CommandReply = oneshot::Sender<Result<(), EngineError>>;

/// Work handed to a loop over its command channel. Executed inside the loop
/// so it never overlaps a tick's publish.
#[derive(Debug)]
pub enum LoopCommand {
    Retweet { target_id: String, reply: CommandReply },
    Like { target_id: String, reply: CommandReply },
}

impl LoopCommand {
    pub fn new(kind: EngagementKind, target_id: String, reply: CommandReply) -> Self {
        match kind {
            EngagementKind::Retweet => LoopCommand::Retweet { target_id, reply },
            EngagementKind::Like => LoopCommand::Like { target_id, reply },
        }
    }

    pub fn into_parts(self) -> (EngagementKind, String, CommandReply) {
        match self {
            LoopCommand::Retweet { target_id, reply } => (EngagementKind::Retweet, target_id, reply),
            LoopCommand::Like { target_id, reply } => (EngagementKind::Like, target_id, reply),
        }
    }
}
