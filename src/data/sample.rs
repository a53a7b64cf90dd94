//! One captioning instance.

use serde::{Deserialize, Serialize};

/// A single image (or video segment) with its reference captions.
/// Immutable once loaded; the visual features are opaque to the trainer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Sample {
    /// Unique sample identifier.
    pub image_id: String,
    /// Source file name, used to match submission-template records.
    pub filename: String,
    /// Pre-extracted visual feature vector.
    pub features: Vec<f32>,
    /// Reference captions, at least one.
    pub captions: Vec<String>,
}
