//! CLI command definitions for the `murmur` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod agents;
pub mod config;
pub mod policy;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use murmur_types::action::ActionKind;

/// Run and inspect automated social-media personas.
#[derive(Parser)]
#[command(name = "murmur", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format written to stderr.
    #[arg(long, global = true, env = "MURMUR_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Also export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log directive derived from `-v` / `--quiet`.
    pub fn log_directive(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn",
            1 => "info,murmur=debug,murmur_core=debug,murmur_infra=debug",
            _ => "trace",
        }
    }

    /// Reject flag combinations that would corrupt a command's output.
    pub fn validate(&self) -> anyhow::Result<()> {
        // The OTel exporter prints spans to stdout, which `run` uses for JSON lines.
        if self.otel && matches!(self.command, Commands::Run { .. }) {
            anyhow::bail!("--otel cannot be used with `run`: spans would be mixed into its stdout stream");
        }
        Ok(())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage personas.
    Agents {
        #[command(subcommand)]
        action: AgentsCommand,
    },

    /// Show what a persona would do right now.
    Decide {
        /// Persona id or name.
        agent: String,
    },

    /// Run text through a persona's content gate.
    CheckContent {
        /// Persona id or name.
        agent: String,

        /// Text to check.
        text: String,

        /// What the text would be published as.
        #[arg(long, value_enum, default_value_t = ContentKind::Tweet)]
        kind: ContentKind,
    },

    /// Inspect engine configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },

    /// Host behavior loops in this process against a dry-run platform.
    ///
    /// Reads control commands as JSON lines on stdin and writes responses and
    /// events as JSON lines on stdout.
    Run {
        /// Start every active persona on launch.
        #[arg(long)]
        all: bool,

        /// Persona ids or names to start on launch.
        #[arg(long = "agent")]
        agents: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum AgentsCommand {
    /// List personas.
    #[command(alias = "ls")]
    List {
        /// Only active personas.
        #[arg(long)]
        active: bool,
    },

    /// Show a persona's full profile.
    Show {
        /// Persona id or name.
        agent: String,
    },

    /// Import personas from a JSON or TOML file.
    Import {
        /// File holding one persona, a JSON array, or a TOML `[[agents]]` list.
        path: PathBuf,
    },

    /// Mark a persona active.
    Activate {
        /// Persona id or name.
        agent: String,
    },

    /// Mark a persona inactive. A running loop stops at its next tick.
    Deactivate {
        /// Persona id or name.
        agent: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration.
    Show,
}

/// Publishable content kinds accepted by `check-content`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContentKind {
    Tweet,
    Reply,
}

impl From<ContentKind> for ActionKind {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Tweet => ActionKind::Tweet,
            ContentKind::Reply => ActionKind::Reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otel_is_refused_for_run() {
        let cli = Cli::try_parse_from(["murmur", "--otel", "run", "--all"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["murmur", "run", "--all"]).unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn otel_is_allowed_elsewhere() {
        let cli = Cli::try_parse_from(["murmur", "--otel", "agents", "list"]).unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn verbosity_maps_to_directive() {
        let cli = Cli::try_parse_from(["murmur", "--quiet", "config", "show"]).unwrap();
        assert_eq!(cli.log_directive(), "error");
        let cli = Cli::try_parse_from(["murmur", "-vv", "config", "show"]).unwrap();
        assert_eq!(cli.log_directive(), "trace");
    }
}
