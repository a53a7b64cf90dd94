//! Corpus-level caption scoring.
//!
//! The scorer side of the system: a PTB-style tokenizer (parallelized, id
//! keyed) and corpus metrics: CIDEr with cached reference statistics,
//! BLEU-1..4, and ROUGE-L. Everything works on id-keyed maps; positional
//! order never matters.

mod bleu;
mod cider;
mod rouge;
pub mod tokenize;

pub use cider::Cider;
pub use tokenize::{tokenize_map, word_tokenize};

use std::collections::BTreeMap;

/// id -> tokenized captions (one per reference; generated maps hold one).
pub type TokenMap = BTreeMap<String, Vec<Vec<String>>>;

/// The fixed evaluation metric table: BLEU-1..4, ROUGE-L, CIDEr.
///
/// Both maps must already be aligned on ids; the evaluator checks that
/// before calling in.
pub fn compute_scores(gts: &TokenMap, gen: &TokenMap) -> BTreeMap<String, f64> {
    let mut scores = BTreeMap::new();
    for n in 1..=4 {
        scores.insert(format!("BLEU-{n}"), bleu::corpus_bleu(gts, gen, n));
    }
    scores.insert("ROUGE-L".to_string(), rouge::corpus_rouge_l(gts, gen));
    let cider = Cider::new(gts);
    let (mean, _) = cider.compute_score(gts, gen);
    scores.insert("CIDEr".to_string(), mean);
    scores
}

#[cfg(test)]
pub(crate) mod testing {
    use super::TokenMap;

    pub fn token_map(entries: &[(&str, &[&str])]) -> TokenMap {
        entries
            .iter()
            .map(|(id, captions)| {
                (
                    (*id).to_string(),
                    captions
                        .iter()
                        .map(|c| c.split_whitespace().map(String::from).collect())
                        .collect(),
                )
            })
            .collect()
    }
}
