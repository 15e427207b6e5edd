//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use wled_core::SortOrder;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Sort order for device lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Name,
    Address,
    LastRefresh,
}

impl From<SortArg> for SortOrder {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortOrder::Name,
            SortArg::Address => SortOrder::Address,
            SortArg::LastRefresh => SortOrder::LastRefresh,
        }
    }
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Omit header row in CSV output (useful for appending)
    #[arg(long)]
    pub no_header: bool,
}

/// Reusable list filter arguments
#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Include hidden devices (overrides config)
    #[arg(long, short = 'a')]
    pub show_hidden: bool,

    /// Sort order (overrides config)
    #[arg(long, value_enum)]
    pub sort: Option<SortArg>,
}

#[derive(Parser)]
#[command(name = "wled")]
#[command(author, version, about = "Discover and monitor WLED lighting controllers", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Config file (default: ~/.config/wled/config.toml)
    #[arg(short, long, global = true, env = "WLED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device database (overrides config)
    #[arg(long, global = true, env = "WLED_DATABASE")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List known devices, split into online and offline
    List {
        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Show stored state without contacting devices
        #[arg(long)]
        cached: bool,
    },

    /// Discover devices on the network and refresh all known devices
    Scan {
        /// mDNS browse time in seconds (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Refresh devices now (all known devices if none given)
    Refresh {
        /// Device identities or names
        ids: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Add a device by network address
    Add {
        /// Address (host or host:port)
        address: String,
    },

    /// Delete a device
    Delete {
        /// Device identity or name
        id: String,
    },

    /// Hide a device from listings
    Hide {
        /// Device identity or name
        id: String,
    },

    /// Show a hidden device in listings again
    Unhide {
        /// Device identity or name
        id: String,
    },

    /// Set a display name (omit NAME to clear it)
    Rename {
        /// Device identity or name
        id: String,

        /// New display name
        name: Option<String>,
    },

    /// Keep devices refreshed and print changes as they happen
    Watch {
        /// Seconds between refreshes (overrides config)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run a discovery scan when starting
        #[arg(long)]
        scan: bool,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
