//! Minimal built-in model variant.
//!
//! A feature-conditioned unigram decoder: one linear projection from the
//! visual features to vocabulary logits, shared across positions. It is not
//! a serious captioner, but it is a genuinely trainable end of the
//! [`CaptionModel`](super::CaptionModel) seam. The whole pipeline (both
//! training phases, beam search, checkpoint round trips) can run and be
//! tested without an external network.

use super::{BeamOptions, BeamOutput, CaptionModel, Param};
use ndarray::{Array2, Array3};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

pub struct LinearCaptionModel {
    feature_dim: usize,
    vocab_len: usize,
    /// (vocab, feature) projection, row-major.
    weight: Param,
    bias: Param,
    /// Caches from the last forward / beam_search, consumed by backward.
    forward_cache: Option<ForwardCache>,
    beam_cache: Option<BeamCache>,
}

struct ForwardCache {
    features: Array2<f32>,
    /// Softmax probabilities per sample, (batch, vocab).
    probs: Array2<f32>,
}

struct BeamCache {
    features: Array2<f32>,
    probs: Array2<f32>,
    /// Candidate token sequences, `[batch][out_size]`.
    sequences: Vec<Vec<Vec<usize>>>,
}

impl LinearCaptionModel {
    pub fn new(feature_dim: usize, vocab_len: usize, rng: &mut ChaCha8Rng) -> Self {
        let scale = 0.1;
        let weight: Vec<f32> = (0..vocab_len * feature_dim)
            .map(|_| rng.random_range(-scale..scale))
            .collect();
        let bias = vec![0.0; vocab_len];
        Self {
            feature_dim,
            vocab_len,
            weight: Param::new("decoder.weight", weight),
            bias: Param::new("decoder.bias", bias),
            forward_cache: None,
            beam_cache: None,
        }
    }

    /// Per-sample log-probabilities and probabilities, (batch, vocab) each.
    fn distributions(&self, features: &Array2<f32>) -> (Array2<f32>, Array2<f32>) {
        let batch = features.nrows();
        let mut log_probs = Array2::zeros((batch, self.vocab_len));
        let mut probs = Array2::zeros((batch, self.vocab_len));

        self.weight.with_data(|w| {
            self.bias.with_data(|b| {
                for row in 0..batch {
                    let mut logits = vec![0.0f32; self.vocab_len];
                    for (v, logit) in logits.iter_mut().enumerate() {
                        let mut z = b[v];
                        for f in 0..self.feature_dim {
                            z += w[v * self.feature_dim + f] * features[[row, f]];
                        }
                        *logit = z;
                    }
                    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                    let log_z = logits.iter().map(|z| (z - max).exp()).sum::<f32>().ln() + max;
                    for (v, &z) in logits.iter().enumerate() {
                        let lp = z - log_z;
                        log_probs[[row, v]] = lp;
                        probs[[row, v]] = lp.exp();
                    }
                }
            });
        });

        (log_probs, probs)
    }

    /// Accumulate dL/dlogits into the parameter gradients for one sample.
    fn accumulate_logit_grad(&self, features: &Array2<f32>, row: usize, grad_z: &[f32]) {
        self.weight.accumulate_grad(|gw| {
            for (v, &gz) in grad_z.iter().enumerate() {
                if gz == 0.0 {
                    continue;
                }
                for f in 0..self.feature_dim {
                    gw[v * self.feature_dim + f] += gz * features[[row, f]];
                }
            }
        });
        self.bias.accumulate_grad(|gb| {
            for (v, &gz) in grad_z.iter().enumerate() {
                gb[v] += gz;
            }
        });
    }
}

impl CaptionModel for LinearCaptionModel {
    fn forward(&mut self, tokens: &Array2<usize>, features: &Array2<f32>) -> Array3<f32> {
        let (log_probs, probs) = self.distributions(features);
        let (batch, seq_len) = tokens.dim();

        let mut out = Array3::zeros((batch, seq_len, self.vocab_len));
        for row in 0..batch {
            for t in 0..seq_len {
                for v in 0..self.vocab_len {
                    out[[row, t, v]] = log_probs[[row, v]];
                }
            }
        }

        self.forward_cache = Some(ForwardCache { features: features.clone(), probs });
        out
    }

    fn backward(&mut self, grad: &Array3<f32>) {
        let cache = self
            .forward_cache
            .take()
            .expect("backward called without a preceding forward");
        let (batch, seq_len, _) = grad.dim();

        for row in 0..batch {
            // log-softmax backward, summed over positions since the
            // distribution is shared across them.
            let mut grad_z = vec![0.0f32; self.vocab_len];
            let mut grad_sum = 0.0f32;
            for t in 0..seq_len {
                for v in 0..self.vocab_len {
                    grad_z[v] += grad[[row, t, v]];
                    grad_sum += grad[[row, t, v]];
                }
            }
            for (v, gz) in grad_z.iter_mut().enumerate() {
                *gz -= cache.probs[[row, v]] * grad_sum;
            }
            self.accumulate_logit_grad(&cache.features, row, &grad_z);
        }
    }

    fn beam_search(&mut self, features: &Array2<f32>, opts: &BeamOptions) -> BeamOutput {
        let (log_probs, probs) = self.distributions(features);
        let batch = features.nrows();
        let beam = opts.beam_size.max(1);
        let out_size = opts.out_size.clamp(1, beam);

        // The per-step distribution is static, so only the globally best
        // `beam` tokens can ever appear in a surviving hypothesis.
        let mut sequences = Vec::with_capacity(batch);
        let mut means = Array2::zeros((batch, out_size));

        for row in 0..batch {
            let mut order: Vec<usize> = (0..self.vocab_len).collect();
            order.sort_by(|&a, &b| {
                log_probs[[row, b]]
                    .partial_cmp(&log_probs[[row, a]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let extensions = &order[..beam.min(self.vocab_len)];

            // (tokens, total log-prob, finished)
            let mut pool: Vec<(Vec<usize>, f32, bool)> = vec![(Vec::new(), 0.0, false)];
            for _ in 0..opts.max_len {
                let mut next = Vec::new();
                for (seq, total, done) in &pool {
                    if *done {
                        next.push((seq.clone(), *total, true));
                        continue;
                    }
                    for &tok in extensions {
                        let mut extended = seq.clone();
                        extended.push(tok);
                        let finished = tok == opts.eos_idx;
                        next.push((extended, total + log_probs[[row, tok]], finished));
                    }
                }
                next.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
                next.truncate(beam);
                let all_done = next.iter().all(|(_, _, done)| *done);
                pool = next;
                if all_done {
                    break;
                }
            }

            let mut row_seqs = Vec::with_capacity(out_size);
            for k in 0..out_size {
                let (seq, total, _) = pool.get(k).cloned().unwrap_or_else(|| {
                    pool.last().cloned().unwrap_or((vec![opts.eos_idx], 0.0, true))
                });
                means[[row, k]] = total / seq.len().max(1) as f32;
                row_seqs.push(seq);
            }
            sequences.push(row_seqs);
        }

        self.beam_cache = Some(BeamCache {
            features: features.clone(),
            probs,
            sequences: sequences.clone(),
        });

        BeamOutput { sequences, log_probs: means }
    }

    fn backward_beam(&mut self, grad: &Array2<f32>) {
        let cache = self
            .beam_cache
            .take()
            .expect("backward_beam called without a preceding beam_search");

        for (row, row_seqs) in cache.sequences.iter().enumerate() {
            let mut grad_z = vec![0.0f32; self.vocab_len];
            for (k, seq) in row_seqs.iter().enumerate() {
                let upstream = grad[[row, k]];
                if upstream == 0.0 || seq.is_empty() {
                    continue;
                }
                // d(mean log-prob)/dz = (count_v / len) - p_v
                let inv_len = 1.0 / seq.len() as f32;
                for &tok in seq {
                    grad_z[tok] += upstream * inv_len;
                }
                for v in 0..self.vocab_len {
                    grad_z[v] -= upstream * cache.probs[[row, v]];
                }
            }
            self.accumulate_logit_grad(&cache.features, row, &grad_z);
        }
    }

    fn params(&self) -> Vec<Param> {
        vec![self.weight.clone(), self.bias.clone()]
    }
}
