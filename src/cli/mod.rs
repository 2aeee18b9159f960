pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fairway")]
#[command(about = "Deduplicating golf article pipeline", long_about = None)]
pub struct Cli {
    /// Number of parallel workers (overrides pipeline.workers)
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Config file (default: ~/.config/fairway/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect pending URLs from every source and process them
    Run {
        /// Process at most this many URLs
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Process only failed and incomplete URLs
    Continue {
        /// Process at most this many URLs
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the pending queue and ledger totals
    Status,
    /// Mark permanently failing URLs so they stop being retried
    Filter {
        /// Report only, leave the ledger untouched
        #[arg(long)]
        dry_run: bool,
    },
    /// Check whether URLs have already been processed
    Check {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Allocate and print the next article number
    NextNumber,
    /// Watch the queue size in the background
    #[command(args_conflicts_with_subcommands = true)]
    Monitor {
        #[command(subcommand)]
        action: Option<MonitorAction>,

        /// Check interval (e.g., "5m", "1h", "30s")
        #[arg(short, long)]
        interval: Option<String>,

        /// Persist a new warning threshold
        #[arg(long)]
        set_warning: Option<usize>,

        /// Persist a new critical threshold
        #[arg(long)]
        set_critical: Option<usize>,

        /// Run the failure filter when the queue is critical
        #[arg(long)]
        auto_clean: bool,

        /// Log file path (default: stdout)
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Run in foreground (don't detach)
        #[arg(short, long)]
        foreground: bool,
    },
}

#[derive(Subcommand)]
pub enum MonitorAction {
    /// Stop the running monitor
    Stop,
    /// Check monitor status
    Status,
}
