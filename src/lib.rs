//! Vietnamese image-captioning trainer
//!
//! This crate trains and evaluates encoder-decoder captioning models with:
//! - Supervised cross-entropy pretraining with a Noam warmup schedule
//! - Self-critical sequence training (SCST) against a CIDEr reward
//! - A patience-driven phase-switch and early-stop policy
//! - Resumable runs: model, optimizer, scheduler, and RNG state persisted
//!   after every epoch in atomic last/best checkpoint slots
//! - Corpus-level evaluation (BLEU, ROUGE-L, CIDEr) and submission export
//!
//! The neural architecture is a collaborator behind the [`model::CaptionModel`]
//! trait; the crate ships a minimal `linear` baseline variant so the training
//! pipeline can be exercised end to end.
//!
//! # Example
//!
//! ```no_run
//! use viecap::config::load_config;
//! use viecap::train::Trainer;
//!
//! let spec = load_config("config.yaml")?;
//! let mut trainer = Trainer::from_spec(&spec)?;
//! trainer.train(true)?;
//! # Ok::<(), viecap::Error>(())
//! ```

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod model;
pub mod optim;
pub mod predict;
pub mod rng;
pub mod scorer;
pub mod train;
pub mod vocab;

pub use error::{Error, Result};
pub use rng::RngState;
pub use vocab::Vocab;
