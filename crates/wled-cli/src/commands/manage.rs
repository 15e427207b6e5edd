//! Commands that change user settings or remove devices.
//!
//! None of these contact the network.

use std::sync::Arc;

use anyhow::{Context as _, Result};

use wled_core::{RefreshCoordinator, Registry};

use super::{Context, resolve_device, write_output};

/// Coordinator without discovery, for operations that only touch the
/// registry. The client is never called.
fn offline_coordinator(ctx: &Context, registry: Arc<Registry>) -> Result<RefreshCoordinator> {
    Ok(RefreshCoordinator::new(
        registry,
        ctx.client()?,
        ctx.config.refresh.coordinator(),
    ))
}

pub async fn cmd_delete(ctx: &Context, arg: &str) -> Result<()> {
    let registry = ctx.open_registry()?;
    let id = resolve_device(&registry, arg).await?;
    let coordinator = offline_coordinator(ctx, registry)?;

    let device = coordinator
        .delete_device(&id)
        .await
        .with_context(|| format!("Failed to delete {}", id))?;

    if !ctx.quiet {
        write_output(&format!("Deleted {} ({})\n", device.display_name(), device.id))?;
    }
    Ok(())
}

pub async fn cmd_set_hidden(ctx: &Context, arg: &str, hidden: bool) -> Result<()> {
    let registry = ctx.open_registry()?;
    let id = resolve_device(&registry, arg).await?;
    let coordinator = offline_coordinator(ctx, registry)?;

    let device = coordinator
        .set_hidden(&id, hidden)
        .await
        .with_context(|| format!("Failed to update {}", id))?;

    if !ctx.quiet {
        let verb = if hidden { "Hid" } else { "Unhid" };
        write_output(&format!("{} {} ({})\n", verb, device.display_name(), device.id))?;
    }
    Ok(())
}

pub async fn cmd_rename(ctx: &Context, arg: &str, name: Option<String>) -> Result<()> {
    let registry = ctx.open_registry()?;
    let id = resolve_device(&registry, arg).await?;
    let coordinator = offline_coordinator(ctx, registry)?;

    let device = coordinator
        .rename_device(&id, name)
        .await
        .with_context(|| format!("Failed to rename {}", id))?;

    if !ctx.quiet {
        match &device.custom_name {
            Some(name) => write_output(&format!("Renamed {} to '{}'\n", device.id, name))?,
            None => write_output(&format!(
                "Cleared custom name of {}, now shown as '{}'\n",
                device.id,
                device.display_name()
            ))?,
        }
    }
    Ok(())
}
