//! tempoctl - operator CLI for the tempo scheduler
//!
//! Triggers rotation jobs by hand and inspects locks and polls through the
//! scheduler's admin API.

use anyhow::Result;
use clap::Parser;

mod client;
mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
