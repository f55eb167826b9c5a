//! CLI for the vidgrab acquisition pipeline.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vidgrab_core::config;
use vidgrab_core::model::Quality;

use commands::{run_config, run_pipeline, run_remove, run_status, RunArgs};

/// Top-level CLI for vidgrab.
#[derive(Debug, Parser)]
#[command(name = "vidgrab")]
#[command(about = "vidgrab: resumable episode and movie acquisition", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

fn parse_quality(s: &str) -> Result<Quality, String> {
    Quality::parse(s).ok_or_else(|| format!("unknown quality '{}' (use 360p, 480p, 720p or 1080p)", s))
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every item listed in a TOML items file.
    Run {
        /// File with `[[item]]` tables (slug, name, series, kind, season, episode).
        #[arg(long, value_name = "FILE")]
        items: PathBuf,
        /// Worker count (default: `download_threads` from the config).
        #[arg(long, value_name = "N")]
        threads: Option<usize>,
        /// Force one quality for this run; completed records at that quality are skipped.
        #[arg(long, value_parser = parse_quality)]
        quality: Option<Quality>,
        /// Download root (default: `download_dir` from the config, else the current directory).
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Show every persisted download record.
    Status,

    /// Remove a download record.
    Remove {
        slug: String,
        #[arg(value_parser = parse_quality)]
        quality: Quality,
        /// Also delete the downloaded file.
        #[arg(long)]
        delete_file: bool,
    },

    /// Print the config file path and the effective configuration.
    Config,
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                items,
                threads,
                quality,
                dir,
            } => run_pipeline(
                &cfg,
                RunArgs {
                    items,
                    threads,
                    quality,
                    dir,
                },
            )?,
            CliCommand::Status => run_status()?,
            CliCommand::Remove {
                slug,
                quality,
                delete_file,
            } => run_remove(&slug, quality, delete_file)?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
