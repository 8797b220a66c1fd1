//! Manual rotation triggers.

use anyhow::Result;
use serde::Deserialize;

use crate::output::{print_info, print_output, print_single, print_success, OutputFormat};

use super::polls::PollRow;
use super::CommandContext;

#[derive(Debug, Deserialize)]
struct WindowResponse {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct RotationSummaryResponse {
    window: WindowResponse,
    closed_count: u64,
    activated_count: u64,
    #[serde(default)]
    activated: Vec<PollRow>,
    #[serde(default)]
    generated: Vec<PollRow>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    created: bool,
    poll: PollRow,
}

/// Run one rotation cycle.
pub async fn rotate(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let raw: serde_json::Value = client.post("/v1/admin/rotation/run").await?;

    if ctx.format == OutputFormat::Json {
        print_single(&raw);
        return Ok(());
    }

    let summary: RotationSummaryResponse = serde_json::from_value(raw)?;
    print_success(&format!(
        "Rotation for window {} .. {}: closed {}, activated {}, generated {}",
        summary.window.start,
        summary.window.end,
        summary.closed_count,
        summary.activated_count,
        summary.generated.len()
    ));

    let touched: Vec<PollRow> = summary
        .activated
        .into_iter()
        .chain(summary.generated)
        .collect();
    if !touched.is_empty() {
        print_output(&touched, ctx.format);
    }
    Ok(())
}

/// Fill the next open slot.
pub async fn generate(ctx: CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let raw: serde_json::Value = client.post("/v1/admin/rotation/generate").await?;

    if ctx.format == OutputFormat::Json {
        print_single(&raw);
        return Ok(());
    }

    let response: GenerateResponse = serde_json::from_value(raw)?;
    if response.created {
        print_success(&format!("Created {} poll {}", response.poll.kind, response.poll.id));
    } else {
        print_info(&format!(
            "Slot already filled by {} poll {}",
            response.poll.kind, response.poll.id
        ));
    }
    print_output(&[response.poll], ctx.format);
    Ok(())
}
