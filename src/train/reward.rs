//! SCST reward computation.
//!
//! Each sample contributes `beam_size` candidates; references are
//! replicated so every candidate scores against its sample's full
//! reference set. The per-sample mean over the beam is the reward baseline
//! (classic self-critical training: variance reduction without a value
//! network).

use crate::error::Result;
use crate::eval::check_alignment;
use crate::scorer::{tokenize_map, Cider};
use crate::vocab::Vocab;
use ndarray::{Array2, Axis};
use std::collections::BTreeMap;

/// Score every beam candidate with the corpus-cached CIDEr.
///
/// Returns rewards of shape (batch, beam). Candidate captions are decoded,
/// tokenized in parallel, and matched to their replicated references by a
/// `sample__candidate` key, so scoring order never matters.
pub fn compute_rewards(
    cider: &Cider,
    ids: &[String],
    sequences: &[Vec<Vec<usize>>],
    references: &[Vec<String>],
    vocab: &Vocab,
) -> Result<Array2<f32>> {
    let beam = sequences.first().map_or(0, Vec::len);
    let mut gen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut gts: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (i, id) in ids.iter().enumerate() {
        for (k, seq) in sequences[i].iter().enumerate() {
            let key = format!("{id}__{k}");
            gen.insert(key.clone(), vec![vocab.decode_caption(seq)]);
            gts.insert(key, references[i].clone());
        }
    }
    check_alignment(&gen, &gts)?;

    let gen_tokens = tokenize_map(&gen);
    let gts_tokens = tokenize_map(&gts);
    let (_, per_sample) = cider.compute_score(&gts_tokens, &gen_tokens);

    let mut rewards = Array2::zeros((ids.len(), beam));
    for (i, id) in ids.iter().enumerate() {
        for k in 0..beam {
            let key = format!("{id}__{k}");
            rewards[[i, k]] = per_sample.get(&key).copied().unwrap_or(0.0) as f32;
        }
    }
    Ok(rewards)
}

/// The self-critical loss and its gradient w.r.t. each candidate's mean
/// log-probability.
///
/// baseline_b = mean_k reward[b, k]
/// loss = mean_{b,k} ( -log_prob[b, k] * (reward[b, k] - baseline_b) )
///
/// With beam 1 the baseline equals the reward and both loss and gradient
/// are exactly zero, the accepted degenerate case.
pub fn scst_loss_grad(rewards: &Array2<f32>, log_probs: &Array2<f32>) -> (f32, Array2<f32>) {
    let (batch, beam) = rewards.dim();
    let count = (batch * beam) as f32;
    let mut grad = Array2::zeros((batch, beam));
    if count == 0.0 {
        return (0.0, grad);
    }

    let baseline = rewards
        .mean_axis(Axis(1))
        .unwrap_or_else(|| ndarray::Array1::zeros(batch));

    let mut loss = 0.0f32;
    for b in 0..batch {
        for k in 0..beam {
            let advantage = rewards[[b, k]] - baseline[b];
            loss += -log_probs[[b, k]] * advantage;
            grad[[b, k]] = -advantage / count;
        }
    }
    (loss / count, grad)
}
