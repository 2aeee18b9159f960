use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fairway::app::AppContext;
use fairway::cli::{commands, Cli, Commands, MonitorAction};
use fairway::config::Config;
use fairway::monitor::{self, MonitorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };
    let config = Config::load_from(&config_path)?;
    let ctx = AppContext::new(config).with_workers(cli.workers);

    match cli.command {
        Commands::Run { limit } => {
            commands::run(&ctx, limit, false).await?;
        }
        Commands::Continue { limit } => {
            commands::run(&ctx, limit, true).await?;
        }
        Commands::Status => {
            commands::status(&ctx)?;
        }
        Commands::Filter { dry_run } => {
            commands::filter(&ctx, dry_run).await?;
        }
        Commands::Check { urls } => {
            commands::check(&ctx, &urls)?;
        }
        Commands::NextNumber => {
            commands::next_number(&ctx).await?;
        }
        Commands::Monitor {
            action,
            interval,
            set_warning,
            set_critical,
            auto_clean,
            log,
            foreground,
        } => match action {
            Some(MonitorAction::Stop) => match monitor::stop_monitor() {
                Ok(()) => println!("Monitor stopped"),
                Err(e) => anyhow::bail!(e),
            },
            Some(MonitorAction::Status) => {
                println!("{}", monitor::monitor_status());
            }
            None => {
                let mut monitor_config = ctx.config.monitor.clone();
                if set_warning.is_some() || set_critical.is_some() {
                    let saved = Config::set_thresholds(&config_path, set_warning, set_critical)?;
                    println!(
                        "Thresholds saved: warning {}, critical {}",
                        saved.monitor.warning_threshold, saved.monitor.critical_threshold
                    );
                    monitor_config.warning_threshold = saved.monitor.warning_threshold;
                    monitor_config.critical_threshold = saved.monitor.critical_threshold;
                }
                if let Some(interval) = interval {
                    monitor_config.interval_secs = MonitorConfig::parse_interval(&interval)
                        .map_err(anyhow::Error::msg)
                        .context("invalid --interval")?;
                }
                monitor_config.auto_clean |= auto_clean;
                if log.is_some() {
                    monitor_config.log_file = log;
                }

                commands::start_monitor(Arc::new(ctx), monitor_config, foreground).await?;
            }
        },
    }

    Ok(())
}
