//! Closed set of scheduler control commands.
//!
//! Every command an operator or embedding process can issue is a variant of
//! `ControlCommand`; `dispatch` handles each one exhaustively.

use serde::{Deserialize, Serialize};

use murmur_types::action::LoopStatus;
use murmur_types::agent::AgentId;
use murmur_types::error::EngineError;

use crate::behavior::command::EngagementKind;
use crate::generator::ContentGenerator;
use crate::platform::PlatformConnector;
use crate::repository::character::CharacterRepository;
use crate::scheduler::Scheduler;

/// A request to the scheduler. Deserializes from
/// `{"command": "start", "agent_id": "..."}` and friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    Start { agent_id: AgentId },
    Stop { agent_id: AgentId },
    StopAll,
    List,
    StartAllActive,
    Engage {
        agent_id: AgentId,
        action: EngagementKind,
        target_id: String,
    },
}

/// Result of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Started { agent_id: AgentId },
    Stopped { agent_id: AgentId },
    StoppedAll { count: usize },
    Loops { loops: Vec<LoopStatus> },
    StartedAll {
        started: Vec<AgentId>,
        failed: Vec<StartFailure>,
    },
    Engaged {
        agent_id: AgentId,
        action: EngagementKind,
        target_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartFailure {
    pub agent_id: AgentId,
    pub error: String,
}

/// Execute one control command against the scheduler.
pub async fn dispatch<R, C, G>(
    scheduler: &Scheduler<R, C, G>,
    command: ControlCommand,
) -> Result<ControlResponse, EngineError>
where
    R: CharacterRepository,
    C: PlatformConnector,
    G: ContentGenerator,
{
    tracing::debug!(?command, "dispatching control command");
    match command {
        ControlCommand::Start { agent_id } => {
            scheduler.start(&agent_id).await?;
            Ok(ControlResponse::Started { agent_id })
        }
        ControlCommand::Stop { agent_id } => {
            scheduler.stop(&agent_id).await;
            Ok(ControlResponse::Stopped { agent_id })
        }
        ControlCommand::StopAll => Ok(ControlResponse::StoppedAll {
            count: scheduler.stop_all().await,
        }),
        ControlCommand::List => Ok(ControlResponse::Loops {
            loops: scheduler.list(),
        }),
        ControlCommand::StartAllActive => {
            let mut started = Vec::new();
            let mut failed = Vec::new();
            for (agent_id, result) in scheduler.start_all_active().await? {
                match result {
                    Ok(()) => started.push(agent_id),
                    Err(e) => failed.push(StartFailure {
                        agent_id,
                        error: e.to_string(),
                    }),
                }
            }
            Ok(ControlResponse::StartedAll { started, failed })
        }
        ControlCommand::Engage {
            agent_id,
            action,
            target_id,
        } => {
            scheduler
                .engage(&agent_id, action, target_id.clone())
                .await?;
            Ok(ControlResponse::Engaged {
                agent_id,
                action,
                target_id,
            })
        }
    }
}
