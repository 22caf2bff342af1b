mod config;
mod host;
mod replay;

use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use autostatus::{load_config, UserId};
use config::TomlConfigStore;
use host::{Host, HostSnapshot};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration as TOML
    Defaults,

    /// Load a settings file, apply environment overrides and print the result
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },

    /// Replay line-delimited JSON envelopes from stdin against a host snapshot
    Replay {
        /// Settings file (TOML); reread for every envelope
        #[arg(long)]
        config: PathBuf,

        /// Host snapshot (JSON): tickets, tasks, profiles, statuses
        #[arg(long)]
        host: PathBuf,

        /// Persist timer sessions to this JSON file between runs
        #[arg(long)]
        timers: Option<PathBuf>,

        /// User issuing timer requests that carry no `user_id`
        #[arg(long, default_value_t = 0)]
        user: UserId,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(io::stderr)
        .init();

    match args.command {
        Command::Defaults => {
            print!("{}", config::defaults_toml()?);
        }
        Command::CheckConfig { config } => {
            let store = TomlConfigStore::new(&config);
            let effective = load_config(&store)
                .with_context(|| format!("Failed to load settings from {}", config.display()))?;
            print!("{}", toml::to_string(&effective.to_values())?);
        }
        Command::Replay {
            config,
            host,
            timers,
            user,
        } => {
            let snapshot = HostSnapshot::load(&host)?;
            let store = Arc::new(TomlConfigStore::new(&config));
            // fail early on an unreadable settings file
            load_config(store.as_ref())
                .with_context(|| format!("Failed to load settings from {}", config.display()))?;

            let host = Host::build(&snapshot, store, timers)?;
            let stdin = io::stdin();
            let summary = replay::run(&host, BufReader::new(stdin.lock()), io::stdout().lock(), user)?;
            info!(
                lines = summary.lines,
                errors = summary.errors,
                updates = host.tickets.updates().len(),
                "Replay finished"
            );
        }
    }

    Ok(())
}
