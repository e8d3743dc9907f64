//! Vaultdump: scheduled database export shipped to object storage
//!
//! Main binary with subcommands:
//! - `daemon`: Run on a cron schedule until SIGINT/SIGTERM
//! - `run-once`: Run a single export immediately
//! - `check`: Validate configuration, tools and schedule

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod daemon;

use config::{LogFormat, Settings};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str =
    "vaultdump=info,vaultdump_job=info,vaultdump_store=info,vaultdump_scheduler=info";

#[derive(Parser)]
#[command(name = "vaultdump")]
#[command(about = "Scheduled database export shipped to object storage", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled daemon (one immediate run, then every tick)
    Daemon {
        #[command(flatten)]
        settings: Settings,
    },

    /// Run the export pipeline once and exit
    RunOnce {
        #[command(flatten)]
        settings: Settings,
    },

    /// Validate configuration, tools and schedule, then print upcoming runs
    Check {
        #[command(flatten)]
        settings: Settings,
    },
}

impl Commands {
    fn settings(&self) -> &Settings {
        match self {
            Commands::Daemon { settings }
            | Commands::RunOnce { settings }
            | Commands::Check { settings } => settings,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before clap reads the environment.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.command.settings().log_format());

    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => tracing::debug!("no .env file found"),
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    match cli.command {
        Commands::Daemon { settings } => {
            let config = settings
                .into_config()
                .map_err(|e| miette::miette!("{}", e))?;
            daemon::run(config).await?;
        }
        Commands::RunOnce { settings } => {
            let config = settings
                .into_config()
                .map_err(|e| miette::miette!("{}", e))?;
            daemon::run_once(config).await?;
        }
        Commands::Check { settings } => {
            let config = settings
                .into_config()
                .map_err(|e| miette::miette!("{}", e))?;
            daemon::check(config).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_reach_settings() {
        let cli = Cli::try_parse_from([
            "vaultdump",
            "run-once",
            "--mongo-url",
            "mongodb://db",
            "--upload-enabled",
            "false",
            "--log-format",
            "pretty",
        ])
        .unwrap();

        let settings = cli.command.settings();
        assert_eq!(settings.mongo_url.as_deref(), Some("mongodb://db"));
        assert_eq!(settings.log_format(), LogFormat::Pretty);
        assert!(matches!(cli.command, Commands::RunOnce { .. }));
    }
}
