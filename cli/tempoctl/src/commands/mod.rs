//! CLI commands.

mod locks;
mod polls;
mod rotation;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::client::ApiClient;
use crate::output::OutputFormat;

/// tempoctl - Operate the tempo poll rotation scheduler.
#[derive(Debug, Parser)]
#[command(name = "tempoctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Base URL of a scheduler replica.
    #[arg(
        long,
        global = true,
        env = "TEMPO_API_URL",
        default_value = "http://127.0.0.1:8080"
    )]
    api_url: String,

    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one rotation cycle now (close, activate, generate).
    Rotate,

    /// Fill the next open slot with a new poll.
    Generate,

    /// Show every scheduler lock.
    Locks,

    /// Reset locks whose TTL has passed.
    Sweep,

    /// List polls by status.
    Polls(polls::PollsArgs),

    /// Archive closed polls past their retention.
    Archive(polls::ArchiveArgs),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let ctx = CommandContext {
            api_url: self.api_url,
            format,
        };

        match self.command {
            Commands::Rotate => rotation::rotate(ctx).await,
            Commands::Generate => rotation::generate(ctx).await,
            Commands::Locks => locks::list_locks(ctx).await,
            Commands::Sweep => locks::sweep(ctx).await,
            Commands::Polls(args) => polls::list_polls(ctx, args).await,
            Commands::Archive(args) => polls::archive(ctx, args).await,
            Commands::Version => {
                println!("tempoctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub api_url: String,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn client(&self) -> Result<ApiClient> {
        ApiClient::new(&self.api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_polls_with_status() {
        let cli = Cli::try_parse_from(["tempoctl", "polls", "--status", "scheduled"]).unwrap();
        match cli.command {
            Commands::Polls(args) => assert_eq!(args.status, "scheduled"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_archive_defaults_to_thirty_days() {
        let cli = Cli::try_parse_from(["tempoctl", "--format", "json", "archive"]).unwrap();
        assert_eq!(cli.format, "json");
        match cli.command {
            Commands::Archive(args) => assert_eq!(args.older_than_days, 30),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
