//! viecap CLI
//!
//! Training, evaluation, and submission export for the Vietnamese
//! image-captioning pipeline.
//!
//! # Usage
//!
//! ```bash
//! # Train from config (picks up the last checkpoint with --resume)
//! viecap train config.yaml
//! viecap train config.yaml --resume
//!
//! # Validate a config
//! viecap validate config.yaml
//!
//! # Decode a dataset with the run's best checkpoint
//! viecap predict config.yaml --output predictions.json --scores
//!
//! # Fill a submission template
//! viecap convert predictions.json sample_submission.json --output submission.json
//! ```

use clap::Parser;
use std::process::ExitCode;
use viecap::cli::{run_command, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
