//! Validation-time evaluation: loss and corpus metrics.

use crate::data::CaptionDataset;
use crate::error::{Error, Result};
use crate::model::{BeamOptions, CaptionModel};
use crate::scorer::{compute_scores, tokenize_map};
use crate::vocab::Vocab;
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;

/// Collapse runs of identical adjacent tokens: decoder stutter like
/// "một một con chó chó" becomes "một con chó". Idempotent.
pub fn collapse_repeats(words: &[String]) -> Vec<String> {
    let mut out = words.to_vec();
    out.dedup();
    out
}

/// Both maps must cover exactly the same sample ids. Scoring a subset would
/// silently skew every corpus metric, so a divergence aborts the call.
pub fn check_alignment<V, W>(
    gen: &BTreeMap<String, V>,
    gts: &BTreeMap<String, W>,
) -> Result<()> {
    let only_gen: Vec<&String> = gen.keys().filter(|id| !gts.contains_key(*id)).collect();
    let only_gts: Vec<&String> = gts.keys().filter(|id| !gen.contains_key(*id)).collect();
    if only_gen.is_empty() && only_gts.is_empty() {
        return Ok(());
    }
    Err(Error::SampleAlignmentMismatch(format!(
        "{} id(s) only in generated {:?}, {} id(s) only in references {:?}",
        only_gen.len(),
        only_gen.iter().take(3).collect::<Vec<_>>(),
        only_gts.len(),
        only_gts.iter().take(3).collect::<Vec<_>>(),
    )))
}

/// Sum and count of per-token negative log-likelihood, with `ignore_index`
/// positions excluded.
pub fn token_nll(
    log_probs: &Array3<f32>,
    targets: &Array2<usize>,
    ignore_index: usize,
) -> (f64, usize) {
    let (batch, seq_len, _) = log_probs.dim();
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for b in 0..batch {
        for t in 0..seq_len {
            let target = targets[[b, t]];
            if target == ignore_index {
                continue;
            }
            sum -= f64::from(log_probs[[b, t, target]]);
            count += 1;
        }
    }
    (sum, count)
}

/// Average per-token NLL over the dataset, padding excluded.
pub fn evaluate_loss(
    model: &mut dyn CaptionModel,
    dataset: &CaptionDataset,
    vocab: &Vocab,
    batch_size: usize,
) -> Result<f64> {
    let pairs = dataset.supervised_pairs();
    let mut sum = 0.0f64;
    let mut count = 0usize;

    for chunk in pairs.chunks(batch_size.max(1)) {
        let batch = dataset.collate_supervised(chunk, vocab);
        let log_probs = model.forward(&batch.tokens, &batch.features);
        let (batch_sum, batch_count) =
            token_nll(&log_probs, &batch.targets, vocab.padding_idx());
        sum += batch_sum;
        count += batch_count;
    }

    if count == 0 {
        return Err(Error::Data("no scoreable tokens in dataset".into()));
    }
    Ok(sum / count as f64)
}

/// Beam-decode the dataset and compute the corpus metric table.
///
/// Decoding keeps the single best sequence per sample, collapses stutter,
/// checks gen/reference id alignment, tokenizes both sides, and scores.
pub fn evaluate_metrics(
    model: &mut dyn CaptionModel,
    dataset: &CaptionDataset,
    vocab: &Vocab,
    beam_size: usize,
    batch_size: usize,
) -> Result<BTreeMap<String, f64>> {
    let mut gen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut gts: BTreeMap<String, Vec<String>> = BTreeMap::new();

    let opts = BeamOptions {
        max_len: vocab.max_caption_length(),
        eos_idx: vocab.eos_idx(),
        beam_size,
        out_size: 1,
    };

    for batch in dataset.eval_batches(batch_size) {
        let decoded = model.beam_search(&batch.features, &opts);
        for (i, id) in batch.ids.iter().enumerate() {
            let words = vocab.decode_words(&decoded.sequences[i][0]);
            let caption = collapse_repeats(&words).join(" ");
            gen.insert(id.clone(), vec![caption]);
            gts.insert(id.clone(), batch.references[i].clone());
        }
    }

    check_alignment(&gen, &gts)?;
    let gen_tokens = tokenize_map(&gen);
    let gts_tokens = tokenize_map(&gts);
    Ok(compute_scores(&gts_tokens, &gen_tokens))
}
