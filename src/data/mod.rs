//! Dataset loading and batch collation.
//!
//! Samples come from a JSON file of `{image_id, filename, features,
//! captions}` records. Supervised batches expand every (sample, caption)
//! pair into a padded token matrix with shifted-right targets; evaluation
//! batches carry features plus the full reference set per sample.

mod dataset;
mod prefetch;
mod sample;

pub use dataset::{CaptionDataset, EvalBatch, TrainBatch};
pub use prefetch::PrefetchLoader;
pub use sample::Sample;
