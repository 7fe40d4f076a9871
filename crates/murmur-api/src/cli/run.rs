//! `run`: host behavior loops in-process.
//!
//! Control commands arrive as JSON lines on stdin (`{"command": "start",
//! "agent_id": "..."}`); responses and wire events leave as JSON lines on
//! stdout. Logs stay on stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use murmur_core::behavior::LoopContext;
use murmur_core::behavior::clock::Clock;
use murmur_core::control::{ControlCommand, ControlResponse, dispatch};
use murmur_core::event::EventBroadcaster;
use murmur_core::generator::ContentGenerator;
use murmur_core::platform::PlatformConnector;
use murmur_core::repository::character::CharacterRepository;
use murmur_core::scheduler::Scheduler;
use murmur_infra::generator::TemplateGenerator;
use murmur_infra::platform::DryRunConnector;
use murmur_types::event::EventEnvelope;

use super::agents::resolve_agent;
use crate::state::AppState;

/// How long the event printer may drain after all loops stopped.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// One line of `run` output answering a control command.
#[derive(Serialize)]
#[serde(untagged)]
enum CommandOutput {
    Ok(ControlResponse),
    Err { error: String },
}

fn emit_line<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => tracing::error!(error = %e, "failed to serialize output line"),
    }
}

/// Print every event as a wire JSON line until the bus closes.
async fn print_events(mut rx: broadcast::Receiver<EventEnvelope>) {
    loop {
        match rx.recv().await {
            Ok(envelope) => emit_line(&envelope.to_wire()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event printer lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn run_command<R, C, G>(scheduler: &Scheduler<R, C, G>, command: ControlCommand)
where
    R: CharacterRepository,
    C: PlatformConnector,
    G: ContentGenerator,
{
    let output = match dispatch(scheduler, command).await {
        Ok(response) => CommandOutput::Ok(response),
        Err(e) => CommandOutput::Err {
            error: e.to_string(),
        },
    };
    emit_line(&output);
}

pub async fn run(state: &AppState, all: bool, agents: &[String]) -> Result<()> {
    let ctx = LoopContext {
        repo: Arc::clone(&state.repo),
        connector: Arc::new(DryRunConnector::new()),
        generator: Arc::new(TemplateGenerator::new()),
        events: EventBroadcaster::new(state.config.events.capacity),
        config: Arc::clone(&state.config),
        clock: Clock::System,
    };
    let scheduler = Scheduler::new(ctx);
    let printer = tokio::spawn(print_events(scheduler.subscribe()));

    if all {
        run_command(&scheduler, ControlCommand::StartAllActive).await;
    }
    for key in agents {
        match resolve_agent(state, key).await {
            Ok(agent) => run_command(&scheduler, ControlCommand::Start { agent_id: agent.id }).await,
            Err(e) => emit_line(&CommandOutput::Err {
                error: e.to_string(),
            }),
        }
    }

    tracing::info!("reading control commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ControlCommand>(line) {
                    Ok(command) => run_command(&scheduler, command).await,
                    Err(e) => emit_line(&CommandOutput::Err {
                        error: format!("invalid command: {e}"),
                    }),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    let stopped = scheduler.stop_all().await;
    tracing::info!(stopped, "all behavior loops stopped");
    drop(scheduler);

    let abort = printer.abort_handle();
    if tokio::time::timeout(DRAIN_GRACE, printer).await.is_err() {
        abort.abort();
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
