//! Explicit RNG state for reproducible, resumable runs.
//!
//! Three independent generators cover the three sources of randomness in a
//! run: batch shuffling, device-side sampling (dropout masks and the like),
//! and model-internal initialization. The whole bundle is a plain value that
//! serializes into the checkpoint, so capturing and restoring randomness is
//! a pure function over [`RngState`] rather than a mutation of process
//! globals.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Bundled generator state, captured in every checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    /// Drives batch shuffling and any host-side sampling.
    pub general: ChaCha8Rng,
    /// Reserved for device-side randomness (dropout masks, noise).
    pub device: ChaCha8Rng,
    /// Reserved for model-internal randomness (parameter init).
    pub model: ChaCha8Rng,
}

impl RngState {
    /// Derive all three generators from one seed, on separate streams so
    /// draws from one never influence the others.
    pub fn seeded(seed: u64) -> Self {
        let mut general = ChaCha8Rng::seed_from_u64(seed);
        let mut device = ChaCha8Rng::seed_from_u64(seed);
        let mut model = ChaCha8Rng::seed_from_u64(seed);
        general.set_stream(0);
        device.set_stream(1);
        model.set_stream(2);
        Self { general, device, model }
    }
}
