//! Refresh command implementation.

use anyhow::Result;

use super::{Context, resolve_device, write_output};
use crate::cli::OutputFormat;
use crate::format::{format_refresh_csv, format_refresh_json, format_refresh_text};

pub async fn cmd_refresh(
    ctx: &Context,
    ids: &[String],
    format: OutputFormat,
    no_header: bool,
) -> Result<()> {
    let coordinator = ctx.coordinator(None)?;

    let report = if ids.is_empty() {
        coordinator.refresh_all().await
    } else {
        let mut resolved = Vec::with_capacity(ids.len());
        for arg in ids {
            resolved.push(resolve_device(coordinator.registry(), arg).await?);
        }
        coordinator.refresh_devices(resolved).await
    };

    let opts = ctx.opts.with_no_header(no_header);
    let content = match format {
        OutputFormat::Json => format_refresh_json(&report, &opts)?,
        OutputFormat::Csv => format_refresh_csv(&report, &opts),
        OutputFormat::Text => format_refresh_text(&report, &opts),
    };
    write_output(&content)
}
