//! Crate-wide error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for captioning-trainer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while training, evaluating, or exporting
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration value is absent. Fatal at startup.
    #[error("missing required config value: {0}")]
    ConfigMissing(String),

    /// A configuration value is present but unusable.
    #[error("config error: {0}")]
    Config(String),

    /// A checkpoint file exists but cannot be decoded. Absence of a
    /// checkpoint is not an error; `CheckpointStore::load` returns
    /// `Ok(None)` for that case.
    #[error("corrupt checkpoint {}: {reason}", .path.display())]
    Checkpoint { path: PathBuf, reason: String },

    /// Generated and reference caption maps disagree on sample ids.
    /// Scoring a subset would silently skew every corpus metric, so the
    /// evaluation call aborts instead.
    #[error("generated/reference id mismatch: {0}")]
    SampleAlignmentMismatch(String),

    /// Dataset or vocabulary content violates a collaborator contract.
    #[error("data error: {0}")]
    Data(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConfigMissing("training.checkpoint_path".into());
        assert!(err.to_string().contains("training.checkpoint_path"));

        let err = Error::SampleAlignmentMismatch("id 3_1 only in gen".into());
        assert!(err.to_string().contains("3_1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
