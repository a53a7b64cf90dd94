//! ROUGE-L: longest-common-subsequence F1, averaged over the corpus.

use super::TokenMap;

fn lcs_length(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn rouge_l_f1(reference: &[String], hypothesis: &[String]) -> f64 {
    if reference.is_empty() || hypothesis.is_empty() {
        return 0.0;
    }
    let lcs = lcs_length(reference, hypothesis) as f64;
    let precision = lcs / hypothesis.len() as f64;
    let recall = lcs / reference.len() as f64;
    if precision + recall == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / (precision + recall)
}

/// Mean over samples of the best F1 against any reference.
pub fn corpus_rouge_l(gts: &TokenMap, gen: &TokenMap) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for (id, candidates) in gen {
        let Some(references) = gts.get(id) else { continue };
        let Some(hypothesis) = candidates.first() else { continue };
        let best = references
            .iter()
            .map(|r| rouge_l_f1(r, hypothesis))
            .fold(0.0, f64::max);
        total += best;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::token_map;
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_is_one() {
        let gts = token_map(&[("a", &["con chó chạy"])]);
        let gen = token_map(&[("a", &["con chó chạy"])]);
        assert_abs_diff_eq!(corpus_rouge_l(&gts, &gen), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_subsequence_scores_between_zero_and_one() {
        let gts = token_map(&[("a", &["con chó đang chạy trong sân"])]);
        let gen = token_map(&[("a", &["con chó chạy"])]);
        let score = corpus_rouge_l(&gts, &gen);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_order_matters_for_lcs() {
        let a: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let b: Vec<String> = ["z", "y", "x"].iter().map(|s| s.to_string()).collect();
        assert_eq!(lcs_length(&a, &b), 1);
    }

    #[test]
    fn test_corpus_averages_over_samples() {
        let gts = token_map(&[("a", &["con chó"]), ("b", &["con mèo"])]);
        let gen = token_map(&[("a", &["con chó"]), ("b", &["xe đạp"])]);
        assert_abs_diff_eq!(corpus_rouge_l(&gts, &gen), 0.5, epsilon = 1e-9);
    }
}
