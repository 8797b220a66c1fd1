//! Poll listing and archival.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::{display_time, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PollsArgs {
    /// scheduled, active, closed or archived.
    #[arg(long, default_value = "active")]
    pub status: String,
}

#[derive(Debug, Args)]
pub struct ArchiveArgs {
    /// Archive closed polls whose window ended more than this many days ago.
    #[arg(long, default_value_t = 30)]
    pub older_than_days: u32,
}

/// Poll as reported by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
pub struct PollRow {
    #[tabled(rename = "ID")]
    pub id: String,

    #[tabled(rename = "Kind")]
    pub kind: String,

    #[tabled(rename = "Status")]
    pub status: String,

    #[tabled(rename = "Category")]
    pub category: String,

    #[tabled(rename = "Question")]
    pub question: String,

    #[tabled(rename = "Opens", display = "display_time")]
    #[serde(default, rename = "scheduled_start")]
    pub opens: Option<String>,

    #[tabled(rename = "Closes", display = "display_time")]
    #[serde(default, rename = "scheduled_end")]
    pub closes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PollsResponse {
    items: Vec<PollRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveResponse {
    archived: u64,
    older_than_days: u32,
}

/// List polls in one status.
pub async fn list_polls(ctx: CommandContext, args: PollsArgs) -> Result<()> {
    let client = ctx.client()?;
    let path = format!("/v1/admin/polls?status={}", args.status);
    let response: PollsResponse = client.get(&path).await?;

    match ctx.format {
        OutputFormat::Table => print_output(&response.items, ctx.format),
        OutputFormat::Json => print_single(&response),
    }
    Ok(())
}

/// Archive old closed polls.
pub async fn archive(ctx: CommandContext, args: ArchiveArgs) -> Result<()> {
    let client = ctx.client()?;
    let path = format!(
        "/v1/admin/polls/archive?older_than_days={}",
        args.older_than_days
    );
    let response: ArchiveResponse = client.post(&path).await?;

    match ctx.format {
        OutputFormat::Table => print_success(&format!(
            "Archived {} poll(s) closed more than {} day(s) ago",
            response.archived, response.older_than_days
        )),
        OutputFormat::Json => print_single(&response),
    }
    Ok(())
}
