//! Scan command implementation.

use std::time::Duration;

use anyhow::{Context as _, Result, bail};

use super::{Context, write_output};
use crate::cli::OutputFormat;
use crate::format::{format_refresh_csv, format_scan_json, format_scan_text};

pub async fn cmd_scan(
    ctx: &Context,
    timeout: Option<u64>,
    format: OutputFormat,
    no_header: bool,
) -> Result<()> {
    let discovery = &ctx.config.discovery;
    if !discovery.mdns && discovery.addresses.is_empty() {
        bail!(
            "No discovery sources configured.\n\
             Enable discovery.mdns or list addresses under discovery.addresses in the config file."
        );
    }

    let coordinator = ctx.coordinator(timeout.map(Duration::from_secs))?;

    if !ctx.quiet && format == OutputFormat::Text && discovery.mdns {
        let secs = timeout.unwrap_or(discovery.scan_duration_secs);
        eprintln!("Scanning for WLED devices ({}s)...", secs);
    }

    let report = coordinator
        .scan_and_refresh()
        .await
        .context("Failed to scan for devices")?;

    let opts = ctx.opts.with_no_header(no_header);
    let content = match format {
        OutputFormat::Json => format_scan_json(&report, &opts)?,
        OutputFormat::Csv => format_refresh_csv(&report.refresh, &opts),
        OutputFormat::Text => format_scan_text(&report, &opts),
    };
    write_output(&content)
}
