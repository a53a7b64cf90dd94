//! Bounded worker-pool batch prefetching.
//!
//! Collation (tokenize, pad, copy features) runs on worker threads so the
//! training thread never waits on it. The output channel is bounded, which
//! caps memory at a few batches regardless of dataset size. Batch order is
//! whatever the workers finish first; the schedule itself is shuffled per
//! epoch by the caller, so order within an epoch carries no meaning.

use crate::data::{CaptionDataset, TrainBatch};
use crate::vocab::Vocab;
use crossbeam_channel::{bounded, unbounded, Receiver};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::thread;

/// One epoch's worth of prefetched supervised batches.
pub struct PrefetchLoader {
    rx: Receiver<TrainBatch>,
    num_batches: usize,
}

impl PrefetchLoader {
    /// Shuffle the (sample, caption) schedule with the epoch RNG, then spawn
    /// `workers` collation threads feeding a bounded channel.
    pub fn spawn(
        dataset: Arc<CaptionDataset>,
        vocab: Arc<Vocab>,
        batch_size: usize,
        workers: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let mut pairs = dataset.supervised_pairs();
        pairs.shuffle(rng);

        let chunks: Vec<Vec<(usize, usize)>> = pairs
            .chunks(batch_size.max(1))
            .map(<[(usize, usize)]>::to_vec)
            .collect();
        let num_batches = chunks.len();

        let (job_tx, job_rx) = unbounded();
        for chunk in chunks {
            job_tx.send(chunk).expect("job receiver held until workers spawn");
        }
        drop(job_tx);

        let workers = workers.max(1);
        let (out_tx, out_rx) = bounded(workers * 2);
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let out_tx = out_tx.clone();
            let dataset = Arc::clone(&dataset);
            let vocab = Arc::clone(&vocab);
            thread::spawn(move || {
                while let Ok(chunk) = job_rx.recv() {
                    let batch = dataset.collate_supervised(&chunk, &vocab);
                    if out_tx.send(batch).is_err() {
                        break;
                    }
                }
            });
        }

        Self { rx: out_rx, num_batches }
    }

    /// Number of batches this epoch will yield.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }
}

impl Iterator for PrefetchLoader {
    type Item = TrainBatch;

    fn next(&mut self) -> Option<TrainBatch> {
        self.rx.recv().ok()
    }
}
