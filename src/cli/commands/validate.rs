//! Validate command: parse and check a config, touch nothing else.

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::load_config;
use crate::error::Result;
use std::path::Path;

pub fn run_validate(config: &Path, level: LogLevel) -> Result<()> {
    let spec = load_config(config)?;
    log(level, LogLevel::Normal, "Config OK");
    log(
        level,
        LogLevel::Verbose,
        &format!("  Model: {} ({:?})", spec.model.name, spec.model.variant),
    );
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "  Datasets: train {}, val {}, test {}",
            spec.dataset.train.display(),
            spec.dataset.val.display(),
            spec.dataset
                .test
                .as_ref()
                .map_or("none".to_string(), |p| p.display().to_string()),
        ),
    );
    Ok(())
}
