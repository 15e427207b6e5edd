//! List command implementation.

use anyhow::Result;
use tracing::debug;

use wled_core::{ListFilter, SortOrder};

use super::{Context, write_output};
use crate::cli::OutputFormat;
use crate::format::{format_devices_csv, format_devices_json, format_devices_text};

pub async fn cmd_list(
    ctx: &Context,
    show_hidden: bool,
    sort: Option<SortOrder>,
    format: OutputFormat,
    no_header: bool,
    cached: bool,
) -> Result<()> {
    let registry = if cached {
        ctx.open_registry()?
    } else {
        let coordinator = ctx.coordinator(None)?;
        let report = coordinator.refresh_all().await;
        debug!(
            "Refreshed {} device(s): {} online, {} offline",
            report.len(),
            report.online_count(),
            report.offline_count()
        );
        std::sync::Arc::clone(coordinator.registry())
    };

    let filter = ListFilter::default()
        .showing_hidden(show_hidden || ctx.config.display.show_hidden)
        .sorted_by(sort.unwrap_or(ctx.config.display.sort));

    let snapshot = registry.list().await;
    let online = snapshot.online(&filter);
    let offline = snapshot.offline(&filter);
    let hidden = if filter.show_hidden_devices {
        0
    } else {
        snapshot.hidden_count()
    };

    let opts = ctx.opts.with_no_header(no_header);
    let content = match format {
        OutputFormat::Json => format_devices_json(&online, &offline, hidden, &opts)?,
        OutputFormat::Csv => format_devices_csv(&online, &offline, &opts),
        OutputFormat::Text => format_devices_text(&online, &offline, hidden, &opts),
    };
    write_output(&content)
}
