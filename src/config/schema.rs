//! YAML schema for a training run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complete run specification.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainSpec {
    pub model: ModelSpec,
    pub dataset: DatasetSpec,
    #[serde(default)]
    pub training: TrainingSpec,
}

/// Closed set of model variants, selected at construction time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Feature-conditioned linear decoder (the built-in baseline).
    #[default]
    Linear,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Run name; the checkpoint directory is `checkpoint_path/<name>`.
    pub name: String,
    #[serde(default)]
    pub variant: ModelVariant,
    /// Dimension of the pre-extracted visual features.
    #[serde(default)]
    pub feature_dim: usize,
    /// Model width used by the warmup schedule.
    #[serde(default = "default_d_model")]
    pub d_model: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetSpec {
    /// Training split (JSON array of samples).
    #[serde(default)]
    pub train: PathBuf,
    /// Validation split.
    #[serde(default)]
    pub val: PathBuf,
    /// Optional held-out test split, scored for reporting only.
    #[serde(default)]
    pub test: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Prefetch worker threads.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSpec {
    /// Parent directory for run checkpoints.
    #[serde(default)]
    pub checkpoint_path: PathBuf,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Warmup steps of the supervised-phase schedule.
    #[serde(default = "default_warmup")]
    pub warmup: usize,
    /// Consecutive non-improving epochs before a phase switch or stop.
    #[serde(default = "default_patience")]
    pub patience: usize,
    /// Fixed learning rate after the switch to self-critical training.
    #[serde(default = "default_rl_lr")]
    pub rl_learning_rate: f32,
    /// Beam width during the SCST pass (also the candidate count).
    #[serde(default = "default_training_beam")]
    pub training_beam_size: usize,
    /// Beam width during evaluation and prediction.
    #[serde(default = "default_evaluating_beam")]
    pub evaluating_beam_size: usize,
    /// Words rarer than this in the training captions become `<unk>`.
    #[serde(default = "default_min_word_freq")]
    pub min_word_freq: usize,
    /// Optional hard cap on epochs. Without it the run ends only when
    /// patience exhausts in the RL phase.
    #[serde(default)]
    pub max_epochs: Option<usize>,
}

impl Default for TrainingSpec {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::new(),
            seed: default_seed(),
            warmup: default_warmup(),
            patience: default_patience(),
            rl_learning_rate: default_rl_lr(),
            training_beam_size: default_training_beam(),
            evaluating_beam_size: default_evaluating_beam(),
            min_word_freq: default_min_word_freq(),
            max_epochs: None,
        }
    }
}

fn default_d_model() -> usize {
    512
}

fn default_batch_size() -> usize {
    32
}

fn default_workers() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

fn default_warmup() -> usize {
    10_000
}

fn default_patience() -> usize {
    5
}

fn default_rl_lr() -> f32 {
    5e-6
}

fn default_training_beam() -> usize {
    5
}

fn default_evaluating_beam() -> usize {
    3
}

fn default_min_word_freq() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_yaml() {
        let spec = TrainSpec {
            model: ModelSpec {
                name: "baseline".into(),
                variant: ModelVariant::Linear,
                feature_dim: 128,
                d_model: 256,
            },
            dataset: DatasetSpec {
                train: "train.json".into(),
                val: "val.json".into(),
                test: Some("test.json".into()),
                batch_size: 16,
                workers: 4,
            },
            training: TrainingSpec::default(),
        };

        let yaml = serde_yaml::to_string(&spec).unwrap();
        let back: TrainSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.model.feature_dim, 128);
        assert_eq!(back.dataset.batch_size, 16);
        assert_eq!(back.training.patience, 5);
    }

    #[test]
    fn test_variant_parses_lowercase() {
        let yaml = "name: x\nvariant: linear\nfeature_dim: 8";
        let spec: ModelSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.variant, ModelVariant::Linear);
    }
}
