//! Watch command implementation.
//!
//! Keeps every known device refreshed on the configured interval and prints
//! registry events until interrupted.

use std::time::Duration;

use anyhow::{Result, bail};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use wled_core::RefreshScheduler;

use super::{Context, write_output};
use crate::config::check_interval;
use crate::format::{format_event_json, format_event_text};

pub async fn cmd_watch(
    ctx: &Context,
    interval: Option<u64>,
    scan: bool,
    json: bool,
) -> Result<()> {
    let interval_secs = interval.unwrap_or(ctx.config.refresh.interval_secs);
    if let Some(err) = check_interval("--interval", interval_secs) {
        bail!("Invalid {}", err);
    }

    let coordinator = ctx.coordinator(None)?;
    let mut events = coordinator.events().subscribe();

    let mut scheduler =
        RefreshScheduler::new(coordinator.clone(), Duration::from_secs(interval_secs))
            .scan_on_start(scan);
    scheduler.start();

    if !ctx.quiet && !json {
        eprintln!(
            "Watching {} device(s), refreshing every {}s. Press Ctrl+C to stop.",
            coordinator.registry().len().await,
            interval_secs
        );
    }

    // First refresh now rather than one interval from now.
    coordinator.trigger_periodic().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let line = if json {
                        Some(format_event_json(&event)?)
                    } else {
                        format_event_text(&event, OffsetDateTime::now_utc(), &ctx.opts)
                    };
                    if let Some(line) = line {
                        write_output(&line)?;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Output fell behind, skipped {} event(s)", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    scheduler.stop().await;
    Ok(())
}
