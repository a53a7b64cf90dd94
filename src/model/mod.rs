//! Model capability interface.
//!
//! The trainer never sees an architecture; it sees [`CaptionModel`]:
//! token-level log-probabilities for the supervised pass, beam search for
//! decoding and SCST, gradient entry points for both, and a state dict for
//! checkpointing. Variants are selected at construction time through the
//! closed [`build_model`] registry.

mod linear;
pub mod param;

pub use linear::LinearCaptionModel;
pub use param::Param;

use crate::config::ModelSpec;
use crate::error::Result;
use crate::vocab::Vocab;
use ndarray::{Array2, Array3};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// Serialized model weights, keyed by parameter name.
pub type StateDict = BTreeMap<String, Vec<f32>>;

/// Beam-search request.
#[derive(Clone, Copy, Debug)]
pub struct BeamOptions {
    /// Hard cap on decoded length.
    pub max_len: usize,
    /// End-of-sequence token id.
    pub eos_idx: usize,
    /// Beam width.
    pub beam_size: usize,
    /// Candidates returned per sample, best first. At most `beam_size`.
    pub out_size: usize,
}

/// Beam-search result for one batch.
#[derive(Clone, Debug)]
pub struct BeamOutput {
    /// `sequences[b][k]` is the k-th best token sequence for sample b,
    /// without the leading `<bos>`; a trailing `<eos>` may be present.
    pub sequences: Vec<Vec<Vec<usize>>>,
    /// Mean per-token log-probability of each candidate, shape
    /// (batch, out_size).
    pub log_probs: Array2<f32>,
}

/// What a lenient weight restore actually did.
#[derive(Clone, Debug, Default)]
pub struct LoadReport {
    /// Model parameters with no entry in the state dict (left untouched).
    pub missing: Vec<String>,
    /// State-dict entries with no matching parameter (ignored).
    pub unexpected: Vec<String>,
    /// Name matched but length did not (left untouched).
    pub size_mismatch: Vec<String>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.size_mismatch.is_empty()
    }
}

/// The narrow seam between the trainer and whatever network sits behind it.
pub trait CaptionModel: Send {
    /// Per-position log-probabilities over the vocabulary, shape
    /// (batch, seq_len, vocab). Caches whatever backward needs.
    fn forward(&mut self, tokens: &Array2<usize>, features: &Array2<f32>) -> Array3<f32>;

    /// Backprop a gradient w.r.t. the log-probabilities of the last
    /// `forward`, accumulating into parameter gradients.
    fn backward(&mut self, grad: &Array3<f32>);

    /// Decode with beam search. Caches whatever `backward_beam` needs.
    fn beam_search(&mut self, features: &Array2<f32>, opts: &BeamOptions) -> BeamOutput;

    /// Backprop a gradient w.r.t. the candidate mean log-probabilities of
    /// the last `beam_search`, shape (batch, out_size).
    fn backward_beam(&mut self, grad: &Array2<f32>);

    /// Shared handles to every parameter, in a stable order.
    fn params(&self) -> Vec<Param>;

    fn zero_grad(&mut self) {
        for param in self.params() {
            param.zero_grad();
        }
    }

    fn state_dict(&self) -> StateDict {
        self.params()
            .into_iter()
            .map(|p| (p.name().to_string(), p.to_vec()))
            .collect()
    }

    /// Lenient restore: copies matching entries, tolerates missing and
    /// unknown keys so checkpoints survive architecture evolution.
    fn load_state_dict(&mut self, state: &StateDict) -> LoadReport {
        let mut report = LoadReport::default();
        let params = self.params();
        let mut known = std::collections::BTreeSet::new();
        for param in &params {
            known.insert(param.name().to_string());
            match state.get(param.name()) {
                Some(values) if values.len() == param.len() => param.set_data(values),
                Some(_) => report.size_mismatch.push(param.name().to_string()),
                None => report.missing.push(param.name().to_string()),
            }
        }
        for key in state.keys() {
            if !known.contains(key) {
                report.unexpected.push(key.clone());
            }
        }
        report
    }
}

/// Construct the configured model variant. The set of variants is closed;
/// new architectures add a variant here rather than a string key somewhere.
pub fn build_model(
    spec: &ModelSpec,
    vocab: &Vocab,
    rng: &mut ChaCha8Rng,
) -> Result<Box<dyn CaptionModel>> {
    match spec.variant {
        crate::config::ModelVariant::Linear => Ok(Box::new(LinearCaptionModel::new(
            spec.feature_dim,
            vocab.len(),
            rng,
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_state_dict_round_trip_is_forward_identical() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut model = LinearCaptionModel::new(2, 6, &mut rng);
        let mut other = LinearCaptionModel::new(2, 6, &mut rng);

        let tokens = Array2::from_elem((1, 3), 4usize);
        let features = Array2::from_shape_vec((1, 2), vec![0.3, -0.7]).unwrap();
        let before = model.forward(&tokens, &features);

        let report = other.load_state_dict(&model.state_dict());
        assert!(report.is_clean());
        let after = other.forward(&tokens, &features);
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_state_dict_is_lenient() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut model = LinearCaptionModel::new(2, 6, &mut rng);

        let mut state = model.state_dict();
        state.remove("decoder.bias");
        state.insert("encoder.extra".into(), vec![1.0]);

        let report = model.load_state_dict(&state);
        assert_eq!(report.missing, vec!["decoder.bias".to_string()]);
        assert_eq!(report.unexpected, vec!["encoder.extra".to_string()]);
    }

    #[test]
    fn test_load_state_dict_skips_size_mismatch() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut model = LinearCaptionModel::new(2, 6, &mut rng);
        let original = model.params()[0].to_vec();

        let mut state = model.state_dict();
        let first = model.params()[0].name().to_string();
        state.insert(first.clone(), vec![9.0; 3]);

        let report = model.load_state_dict(&state);
        assert_eq!(report.size_mismatch, vec![first]);
        assert_eq!(model.params()[0].to_vec(), original);
    }
}
