//! murmur CLI entry point.
//!
//! Binary name: `murmur`
//!
//! Parses CLI arguments, initializes logging, the store and configuration,
//! then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use cli::{AgentsCommand, Cli, Commands, ConfigCommand};
use murmur_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let format: LogFormat = cli.log_format.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    init_tracing(format, cli.log_directive(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init().await?;

    match cli.command {
        Commands::Agents { action } => match action {
            AgentsCommand::List { active } => {
                cli::agents::list_agents(&state, active, cli.json).await?;
            }
            AgentsCommand::Show { agent } => {
                cli::agents::show_agent(&state, &agent, cli.json).await?;
            }
            AgentsCommand::Import { path } => {
                cli::agents::import_agents(&state, &path, cli.json).await?;
            }
            AgentsCommand::Activate { agent } => {
                cli::agents::set_active(&state, &agent, true, cli.json).await?;
            }
            AgentsCommand::Deactivate { agent } => {
                cli::agents::set_active(&state, &agent, false, cli.json).await?;
            }
        },

        Commands::Decide { agent } => {
            cli::policy::decide(&state, &agent, cli.json).await?;
        }

        Commands::CheckContent { agent, text, kind } => {
            cli::policy::check_content(&state, &agent, &text, kind.into(), cli.json).await?;
        }

        Commands::Config { action } => match action {
            ConfigCommand::Show => cli::config::show_config(&state, cli.json)?,
        },

        Commands::Run { all, agents } => {
            cli::run::run(&state, all, &agents).await?;
        }
    }

    Ok(())
}
