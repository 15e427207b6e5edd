//! Add command implementation.

use anyhow::{Context as _, Result};

use super::{Context, write_output};

pub async fn cmd_add(ctx: &Context, address: &str) -> Result<()> {
    let coordinator = ctx.coordinator(None)?;
    let device = coordinator
        .add_device(address)
        .await
        .with_context(|| format!("Failed to add device at {}", address))?;

    if !ctx.quiet {
        write_output(&format!(
            "Added {} ({}) at {}\n",
            device.display_name(),
            device.id,
            device.address
        ))?;
    }
    Ok(())
}
