//! Configuration validation: absent required values are fatal at startup.

use super::TrainSpec;
use crate::error::{Error, Result};

/// Reject specs that cannot possibly run. Required values missing from the
/// YAML surface as `ConfigMissing` with the field path, before any data is
/// touched.
pub fn validate_config(spec: &TrainSpec) -> Result<()> {
    if spec.model.name.is_empty() {
        return Err(Error::ConfigMissing("model.name".into()));
    }
    if spec.model.feature_dim == 0 {
        return Err(Error::ConfigMissing("model.feature_dim".into()));
    }
    if spec.dataset.train.as_os_str().is_empty() {
        return Err(Error::ConfigMissing("dataset.train".into()));
    }
    if spec.dataset.val.as_os_str().is_empty() {
        return Err(Error::ConfigMissing("dataset.val".into()));
    }
    if spec.training.checkpoint_path.as_os_str().is_empty() {
        return Err(Error::ConfigMissing("training.checkpoint_path".into()));
    }

    if spec.dataset.batch_size == 0 {
        return Err(Error::Config("dataset.batch_size must be positive".into()));
    }
    if spec.training.patience == 0 {
        return Err(Error::Config("training.patience must be positive".into()));
    }
    if spec.training.training_beam_size == 0 || spec.training.evaluating_beam_size == 0 {
        return Err(Error::Config("beam sizes must be positive".into()));
    }
    if spec.training.rl_learning_rate <= 0.0 {
        return Err(Error::Config("training.rl_learning_rate must be positive".into()));
    }
    Ok(())
}
