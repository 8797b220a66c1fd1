//! Lock inspection and sweeping.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::output::{display_option, display_time, print_output, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Lock as reported by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize, Tabled)]
struct LockRow {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Held")]
    held: bool,

    #[tabled(rename = "Holder", display = "display_option")]
    #[serde(default)]
    locked_by: Option<String>,

    #[tabled(rename = "Expires", display = "display_time")]
    #[serde(default)]
    expires_at: Option<String>,

    #[tabled(rename = "Last Run", display = "display_time")]
    #[serde(default)]
    last_run_at: Option<String>,

    #[tabled(rename = "Last Result", display = "display_option")]
    #[serde(default)]
    last_run_result: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LocksResponse {
    items: Vec<LockRow>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CleanupResponse {
    reset: u64,
}

/// List every lock.
pub async fn list_locks(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let response: LocksResponse = client.get("/v1/admin/locks").await?;

    match ctx.format {
        OutputFormat::Table => print_output(&response.items, ctx.format),
        OutputFormat::Json => print_single(&response),
    }
    Ok(())
}

/// Reset expired locks.
pub async fn sweep(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let response: CleanupResponse = client.post("/v1/admin/locks/cleanup").await?;

    match ctx.format {
        OutputFormat::Table => print_success(&format!("Reset {} expired lock(s)", response.reset)),
        OutputFormat::Json => print_single(&response),
    }
    Ok(())
}
