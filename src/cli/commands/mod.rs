//! CLI definition and command dispatch.

mod convert;
mod predict;
mod train;
mod validate;

use crate::cli::LogLevel;
use crate::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vietnamese image-captioning trainer
#[derive(Parser)]
#[command(name = "viecap", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train from a YAML config, resuming from the last checkpoint if asked
    Train {
        /// Run configuration (YAML)
        config: PathBuf,
        /// Resume from the run's last checkpoint if present
        #[arg(long)]
        resume: bool,
    },
    /// Load and validate a config without running anything
    Validate {
        /// Run configuration (YAML)
        config: PathBuf,
    },
    /// Beam-search prediction over a dataset, from a trained checkpoint
    Predict {
        /// Run configuration (YAML)
        config: PathBuf,
        /// Dataset to decode (JSON); defaults to the config's test or val split
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Checkpoint to load; defaults to the run's best, then last, slot
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Where to write prediction records
        #[arg(long, default_value = "predictions.json")]
        output: PathBuf,
        /// Attach per-sample metric tables
        #[arg(long)]
        scores: bool,
    },
    /// Fill a submission template with generated captions
    Convert {
        /// Prediction records produced by `predict`
        predictions: PathBuf,
        /// Submission template (JSON array with an `id` field per record)
        template: PathBuf,
        /// Where to write the filled submission
        #[arg(long, default_value = "submission.json")]
        output: PathBuf,
    },
}

pub fn run_command(cli: Cli) -> Result<()> {
    let level = LogLevel::from_flags(cli.quiet, cli.verbose);
    match cli.command {
        Commands::Train { config, resume } => train::run_train(&config, resume, level),
        Commands::Validate { config } => validate::run_validate(&config, level),
        Commands::Predict { config, dataset, checkpoint, output, scores } => {
            predict::run_predict(&config, dataset.as_deref(), checkpoint.as_deref(), &output, scores, level)
        }
        Commands::Convert { predictions, template, output } => {
            convert::run_convert(&predictions, &template, &output, level)
        }
    }
}
