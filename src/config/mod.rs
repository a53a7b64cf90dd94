//! Run configuration: YAML schema, loading, validation.

mod schema;
mod validate;

pub use schema::{DatasetSpec, ModelSpec, ModelVariant, TrainSpec, TrainingSpec};
pub use validate::validate_config;

use crate::error::{Error, Result};
use std::path::Path;

/// Load and validate a YAML run specification.
pub fn load_config(path: impl AsRef<Path>) -> Result<TrainSpec> {
    let yaml = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        Error::Config(format!("cannot read {}: {e}", path.as_ref().display()))
    })?;
    let spec: TrainSpec = serde_yaml::from_str(&yaml)
        .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.as_ref().display())))?;
    validate_config(&spec)?;
    Ok(spec)
}
