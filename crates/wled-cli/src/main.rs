use std::io;

use anyhow::{Context as _, Result};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;

use cli::{Cli, Commands};
use commands::Context;
use config::Config;
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "wled", &mut io::stdout());
        return Ok(());
    }

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Logs go to stderr so JSON and CSV output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };
    config.validate()?;

    let ctx = Context {
        config,
        database: cli.database,
        opts: FormatOptions::new(cli.no_color),
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::List {
            filter,
            output,
            cached,
        } => {
            commands::cmd_list(
                &ctx,
                filter.show_hidden,
                filter.sort.map(Into::into),
                output.format,
                output.no_header,
                cached,
            )
            .await?;
        }
        Commands::Scan { timeout, output } => {
            commands::cmd_scan(&ctx, timeout, output.format, output.no_header).await?;
        }
        Commands::Refresh { ids, output } => {
            commands::cmd_refresh(&ctx, &ids, output.format, output.no_header).await?;
        }
        Commands::Add { address } => {
            commands::cmd_add(&ctx, &address).await?;
        }
        Commands::Delete { id } => {
            commands::cmd_delete(&ctx, &id).await?;
        }
        Commands::Hide { id } => {
            commands::cmd_set_hidden(&ctx, &id, true).await?;
        }
        Commands::Unhide { id } => {
            commands::cmd_set_hidden(&ctx, &id, false).await?;
        }
        Commands::Rename { id, name } => {
            commands::cmd_rename(&ctx, &id, name).await?;
        }
        Commands::Watch {
            interval,
            scan,
            json,
        } => {
            commands::cmd_watch(&ctx, interval, scan, json).await?;
        }
        // Handled before tracing init
        Commands::Completions { .. } => {}
    }

    Ok(())
}
