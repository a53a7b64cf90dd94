//! CIDEr: consensus-based captioning metric, used both for evaluation and
//! as the SCST reward.
//!
//! Reference-corpus document frequencies are computed once at construction
//! and reused for every `compute_score` call, which is what makes the
//! per-batch RL reward affordable.

use super::TokenMap;
use std::collections::{BTreeMap, HashMap};

const MAX_N: usize = 4;
const SCALE: f64 = 10.0;

type Ngram = Vec<String>;

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<Ngram, f64> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window.to_vec()).or_insert(0.0) += 1.0;
        }
    }
    counts
}

/// tf-idf vector and its L2 norm for one caption at one n-gram order.
fn tfidf_vector(
    tokens: &[String],
    n: usize,
    doc_freq: &HashMap<Ngram, f64>,
    log_num_docs: f64,
) -> (HashMap<Ngram, f64>, f64) {
    let counts = ngram_counts(tokens, n);
    let mut vec = HashMap::with_capacity(counts.len());
    let mut norm_sq = 0.0;
    for (ngram, count) in counts {
        let df = doc_freq.get(&ngram).copied().unwrap_or(0.0).max(1.0);
        let idf = (log_num_docs - df.ln()).max(0.0);
        let weight = count * idf;
        norm_sq += weight * weight;
        vec.insert(ngram, weight);
    }
    (vec, norm_sq.sqrt())
}

fn cosine(
    a: &HashMap<Ngram, f64>,
    norm_a: f64,
    b: &HashMap<Ngram, f64>,
    norm_b: f64,
) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let dot: f64 = small
        .iter()
        .filter_map(|(ngram, &w)| large.get(ngram).map(|&v| w * v))
        .sum();
    dot / (norm_a * norm_b)
}

/// Corpus-cached CIDEr scorer.
pub struct Cider {
    /// Per order n (1..=4): n-gram -> number of reference documents
    /// containing it.
    doc_freq: Vec<HashMap<Ngram, f64>>,
    log_num_docs: f64,
}

impl Cider {
    /// Cache document frequencies over the reference corpus.
    pub fn new(references: &TokenMap) -> Self {
        let mut doc_freq = vec![HashMap::new(); MAX_N];
        for captions in references.values() {
            for (n, freq) in doc_freq.iter_mut().enumerate() {
                let mut seen: HashMap<Ngram, ()> = HashMap::new();
                for caption in captions {
                    for ngram in ngram_counts(caption, n + 1).into_keys() {
                        seen.entry(ngram).or_insert(());
                    }
                }
                for ngram in seen.into_keys() {
                    *freq.entry(ngram).or_insert(0.0) += 1.0;
                }
            }
        }
        let log_num_docs = (references.len().max(1) as f64).ln();
        Self { doc_freq, log_num_docs }
    }

    /// Score one candidate against its references: mean tf-idf cosine over
    /// references, averaged over n-gram orders, scaled by 10.
    fn score_one(&self, candidate: &[String], references: &[Vec<String>]) -> f64 {
        if references.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        for n in 1..=MAX_N {
            let (cand_vec, cand_norm) =
                tfidf_vector(candidate, n, &self.doc_freq[n - 1], self.log_num_docs);
            let mut sim = 0.0;
            for reference in references {
                let (ref_vec, ref_norm) =
                    tfidf_vector(reference, n, &self.doc_freq[n - 1], self.log_num_docs);
                sim += cosine(&cand_vec, cand_norm, &ref_vec, ref_norm);
            }
            total += sim / references.len() as f64;
        }
        SCALE * total / MAX_N as f64
    }

    /// Corpus mean plus per-sample scores, keyed by id. Only ids present in
    /// both maps are scored; alignment is the caller's invariant.
    pub fn compute_score(&self, gts: &TokenMap, gen: &TokenMap) -> (f64, BTreeMap<String, f64>) {
        let mut per_sample = BTreeMap::new();
        for (id, candidates) in gen {
            let (Some(references), Some(candidate)) = (gts.get(id), candidates.first()) else {
                continue;
            };
            per_sample.insert(id.clone(), self.score_one(candidate, references));
        }
        let mean = if per_sample.is_empty() {
            0.0
        } else {
            per_sample.values().sum::<f64>() / per_sample.len() as f64
        };
        (mean, per_sample)
    }
}
