//! In-memory caption dataset and batch collation.

use crate::data::Sample;
use crate::error::{Error, Result};
use crate::vocab::Vocab;
use ndarray::{Array2, Axis};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

/// A supervised batch: padded token matrix, shifted-right targets, features.
///
/// Row layout follows the usual causal framing:
/// tokens  `[<bos>, w1 .. wn, <pad>...]`
/// targets `[w1 .. wn, <eos>, <pad>...]`
#[derive(Clone, Debug)]
pub struct TrainBatch {
    pub tokens: Array2<usize>,
    pub targets: Array2<usize>,
    pub features: Array2<f32>,
}

impl TrainBatch {
    pub fn batch_size(&self) -> usize {
        self.tokens.nrows()
    }
}

/// An evaluation/SCST batch: features plus reference sets, keyed by id.
#[derive(Clone, Debug)]
pub struct EvalBatch {
    pub ids: Vec<String>,
    pub filenames: Vec<String>,
    pub features: Array2<f32>,
    pub references: Vec<Vec<String>>,
}

impl EvalBatch {
    pub fn batch_size(&self) -> usize {
        self.ids.len()
    }
}

/// All samples of one split, loaded eagerly.
#[derive(Clone, Debug)]
pub struct CaptionDataset {
    samples: Vec<Sample>,
    feature_dim: usize,
}

impl CaptionDataset {
    /// Load a JSON array of samples, validating the collaborator contract:
    /// unique ids, uniform feature dimension, at least one caption each.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let samples: Vec<Sample> = serde_json::from_str(&json).map_err(|e| {
            Error::Serialization(format!("dataset {}: {e}", path.as_ref().display()))
        })?;
        Self::from_samples(samples)
    }

    pub fn from_samples(samples: Vec<Sample>) -> Result<Self> {
        let feature_dim = samples
            .first()
            .map(|s| s.features.len())
            .ok_or_else(|| Error::Data("dataset is empty".into()))?;

        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(sample.image_id.as_str()) {
                return Err(Error::Data(format!("duplicate image_id {}", sample.image_id)));
            }
            if sample.features.len() != feature_dim {
                return Err(Error::Data(format!(
                    "{}: feature dim {} != {}",
                    sample.image_id,
                    sample.features.len(),
                    feature_dim
                )));
            }
            if sample.captions.is_empty() {
                return Err(Error::Data(format!("{} has no captions", sample.image_id)));
            }
        }

        Ok(Self { samples, feature_dim })
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// id -> reference captions, for corpus-statistic caches and scoring.
    pub fn reference_map(&self) -> BTreeMap<String, Vec<String>> {
        self.samples
            .iter()
            .map(|s| (s.image_id.clone(), s.captions.clone()))
            .collect()
    }

    /// Every (sample, caption) pair; the supervised epoch schedule.
    pub fn supervised_pairs(&self) -> Vec<(usize, usize)> {
        self.samples
            .iter()
            .enumerate()
            .flat_map(|(si, s)| (0..s.captions.len()).map(move |ci| (si, ci)))
            .collect()
    }

    /// Collate (sample, caption) pairs into one padded supervised batch.
    pub fn collate_supervised(&self, pairs: &[(usize, usize)], vocab: &Vocab) -> TrainBatch {
        let encoded: Vec<Vec<usize>> = pairs
            .iter()
            .map(|&(si, ci)| vocab.encode_caption(&self.samples[si].captions[ci]))
            .collect();
        // Width covers the longest caption plus its frame token.
        let width = encoded.iter().map(|e| e.len() + 1).max().unwrap_or(1);

        let pad = vocab.padding_idx();
        let mut tokens = Array2::from_elem((pairs.len(), width), pad);
        let mut targets = Array2::from_elem((pairs.len(), width), pad);
        let mut features = Array2::zeros((pairs.len(), self.feature_dim));

        for (row, (&(si, _), ids)) in pairs.iter().zip(&encoded).enumerate() {
            tokens[[row, 0]] = vocab.bos_idx();
            for (col, &id) in ids.iter().enumerate() {
                tokens[[row, col + 1]] = id;
                targets[[row, col]] = id;
            }
            targets[[row, ids.len()]] = vocab.eos_idx();
            features
                .index_axis_mut(Axis(0), row)
                .assign(&ndarray::ArrayView1::from(&self.samples[si].features));
        }

        TrainBatch { tokens, targets, features }
    }

    /// Sample-level batches for evaluation and the SCST pass.
    pub fn eval_batches(&self, batch_size: usize) -> Vec<EvalBatch> {
        let batch_size = batch_size.max(1);
        self.samples
            .chunks(batch_size)
            .map(|chunk| {
                let mut features = Array2::zeros((chunk.len(), self.feature_dim));
                for (row, sample) in chunk.iter().enumerate() {
                    features
                        .index_axis_mut(Axis(0), row)
                        .assign(&ndarray::ArrayView1::from(&sample.features));
                }
                EvalBatch {
                    ids: chunk.iter().map(|s| s.image_id.clone()).collect(),
                    filenames: chunk.iter().map(|s| s.filename.clone()).collect(),
                    features,
                    references: chunk.iter().map(|s| s.captions.clone()).collect(),
                }
            })
            .collect()
    }
}
