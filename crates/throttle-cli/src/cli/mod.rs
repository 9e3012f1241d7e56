//! CLI for the throttle task scheduler.

mod commands;
mod replay_file;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use throttle_core::config::{self, ThrottleConfig};

use commands::{run_completions, run_config, run_replay, ReplayArgs};

/// Top-level CLI for the throttle scheduler.
#[derive(Debug, Parser)]
#[command(name = "throttle")]
#[command(about = "Rate-limited, priority-ordered task scheduler with adaptive retry", long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of ~/.config/throttle/config.toml.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Show the effective configuration (validated).
    Config {
        /// Print only the config file path.
        #[arg(long)]
        path: bool,
    },

    /// Dry-run a scripted backlog through the scheduler and batch runner.
    Replay {
        /// JSON file with the scripted backlog.
        file: PathBuf,
        /// Override batch.batch_size.
        #[arg(long, value_name = "N")]
        batch_size: Option<usize>,
        /// Override batch.max_retries_per_item.
        #[arg(long, value_name = "N")]
        max_retries: Option<u32>,
        /// Append retry outcome records to this JSON-lines file.
        #[arg(long, value_name = "FILE")]
        records: Option<PathBuf>,
        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn load_config(explicit: Option<&PathBuf>) -> Result<ThrottleConfig> {
    match explicit {
        Some(path) => config::load_from_path(path),
        None => config::load_or_init(),
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(());
        }

        let cfg = load_config(cli.config.as_ref())?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Config { path } => run_config(&cfg, cli.config.as_deref(), path)?,
            CliCommand::Replay {
                file,
                batch_size,
                max_retries,
                records,
                json,
            } => {
                let args = ReplayArgs {
                    file,
                    batch_size,
                    max_retries,
                    records,
                    json,
                };
                run_replay(&cfg, &args).await?;
            }
            CliCommand::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
