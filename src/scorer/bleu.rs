//! Corpus BLEU-n.
//!
//! Modified n-gram precision with clipping against the best-matching
//! reference, geometric mean over orders 1..=n, corpus-level brevity
//! penalty (Papineni et al., 2002).

use super::TokenMap;
use std::collections::HashMap;

pub(crate) fn extract_ngrams(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n && n > 0 {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

/// Corpus BLEU of order `max_n` over aligned id-keyed maps. The generated
/// map contributes its first caption per id.
pub fn corpus_bleu(gts: &TokenMap, gen: &TokenMap, max_n: usize) -> f64 {
    let mut clipped = vec![0usize; max_n];
    let mut totals = vec![0usize; max_n];
    let mut hyp_len = 0usize;
    let mut ref_len = 0usize;

    for (id, candidates) in gen {
        let Some(references) = gts.get(id) else { continue };
        let Some(hypothesis) = candidates.first() else { continue };

        hyp_len += hypothesis.len();
        ref_len += references
            .iter()
            .map(Vec::len)
            .min_by_key(|&len| (len as isize - hypothesis.len() as isize).unsigned_abs())
            .unwrap_or(0);

        for n in 1..=max_n {
            let hyp_ngrams = extract_ngrams(hypothesis, n);
            for (ngram, &count) in &hyp_ngrams {
                let max_ref = references
                    .iter()
                    .map(|r| extract_ngrams(r, n).get(ngram).copied().unwrap_or(0))
                    .max()
                    .unwrap_or(0);
                clipped[n - 1] += count.min(max_ref);
            }
            totals[n - 1] += hyp_ngrams.values().sum::<usize>();
        }
    }

    let mut log_precision_sum = 0.0;
    for n in 0..max_n {
        if totals[n] == 0 || clipped[n] == 0 {
            return 0.0;
        }
        log_precision_sum += (clipped[n] as f64 / totals[n] as f64).ln();
    }
    let geo_mean = (log_precision_sum / max_n as f64).exp();

    let bp = if hyp_len == 0 {
        0.0
    } else if hyp_len >= ref_len {
        1.0
    } else {
        (1.0 - ref_len as f64 / hyp_len as f64).exp()
    };

    bp * geo_mean
}

#[cfg(test)]
mod tests {
    use super::super::testing::token_map;
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_is_one() {
        let gts = token_map(&[("a", &["con chó đang chạy nhanh"])]);
        let gen = token_map(&[("a", &["con chó đang chạy nhanh"])]);
        for n in 1..=4 {
            assert_abs_diff_eq!(corpus_bleu(&gts, &gen, n), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_no_overlap_is_zero() {
        let gts = token_map(&[("a", &["con chó"])]);
        let gen = token_map(&[("a", &["xe đạp"])]);
        assert_eq!(corpus_bleu(&gts, &gen, 1), 0.0);
    }

    #[test]
    fn test_clipping_limits_repeats() {
        // Hypothesis repeats a reference word; clipped precision caps the
        // credit at the reference count.
        let gts = token_map(&[("a", &["con chó chạy"])]);
        let gen = token_map(&[("a", &["chó chó chó"])]);
        assert_abs_diff_eq!(corpus_bleu(&gts, &gen, 1), 1.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn test_brevity_penalty_applies() {
        let gts = token_map(&[("a", &["con chó đang chạy"])]);
        let gen = token_map(&[("a", &["con"])]);
        let score = corpus_bleu(&gts, &gen, 1);
        assert!(score < 1.0);
        assert!(score > 0.0);
    }

    #[test]
    fn test_best_reference_is_used() {
        let gts = token_map(&[("a", &["hoàn toàn khác biệt", "con chó chạy"])]);
        let gen = token_map(&[("a", &["con chó chạy"])]);
        assert_abs_diff_eq!(corpus_bleu(&gts, &gen, 2), 1.0, epsilon = 1e-9);
    }
}
