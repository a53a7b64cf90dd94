//! The training core: phase policy, SCST reward, and the epoch loop.

mod policy;
mod reward;
mod trainer;

pub use policy::{Phase, PhasePolicy, PolicyOutcome};
pub use reward::{compute_rewards, scst_loss_grad};
pub use trainer::Trainer;
