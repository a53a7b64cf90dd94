//! Train command implementation.

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::load_config;
use crate::error::Result;
use crate::train::Trainer;
use std::path::Path;

pub fn run_train(config: &Path, resume: bool, level: LogLevel) -> Result<()> {
    log(level, LogLevel::Normal, &format!("Training from {}", config.display()));

    let spec = load_config(config)?;
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "  Model: {} ({:?}), feature dim {}",
            spec.model.name, spec.model.variant, spec.model.feature_dim
        ),
    );
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "  Patience {}, warmup {}, RL lr {}",
            spec.training.patience, spec.training.warmup, spec.training.rl_learning_rate
        ),
    );

    let mut trainer = Trainer::from_spec(&spec)?;
    trainer.train(resume)?;

    log(level, LogLevel::Normal, "Training complete");
    Ok(())
}
