//! The phase controller: drives epochs, applies the patience policy, and
//! persists run state after every epoch.

use crate::checkpoint::{CheckpointStore, RunState};
use crate::config::TrainSpec;
use crate::data::{CaptionDataset, PrefetchLoader};
use crate::error::Result;
use crate::eval::{evaluate_loss, evaluate_metrics, token_nll};
use crate::model::{build_model, BeamOptions, CaptionModel};
use crate::optim::{Adam, Optimizer, WarmupInverseSqrtLR};
use crate::rng::RngState;
use crate::scorer::{tokenize_map, Cider};
use crate::train::{compute_rewards, scst_loss_grad, Phase, PhasePolicy};
use crate::vocab::Vocab;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Orchestrates the two training phases over one model and one run
/// directory. All mutable state lives on the single controlling thread;
/// worker pools only ever see immutable snapshots.
pub struct Trainer {
    spec: TrainSpec,
    model: Box<dyn CaptionModel>,
    optimizer: Box<dyn Optimizer>,
    scheduler: WarmupInverseSqrtLR,
    policy: PhasePolicy,
    rng: RngState,
    vocab: Arc<Vocab>,
    train_dataset: Arc<CaptionDataset>,
    val_dataset: CaptionDataset,
    test_dataset: Option<CaptionDataset>,
    train_cider: Cider,
    store: CheckpointStore,
    epoch: usize,
    best_test_metric: f64,
    warned_degenerate_beam: bool,
}

impl Trainer {
    /// Build everything from a validated spec: datasets, cached vocabulary,
    /// model, optimizer, schedule, and the run's checkpoint store.
    pub fn from_spec(spec: &TrainSpec) -> Result<Self> {
        let train_dataset = CaptionDataset::from_json_file(&spec.dataset.train)?;
        let val_dataset = CaptionDataset::from_json_file(&spec.dataset.val)?;
        let test_dataset = spec
            .dataset
            .test
            .as_ref()
            .map(CaptionDataset::from_json_file)
            .transpose()?;

        let run_dir = spec.training.checkpoint_path.join(&spec.model.name);
        let store = CheckpointStore::new(&run_dir)?;

        let vocab_path = run_dir.join("vocab.json");
        let vocab = if vocab_path.is_file() {
            eprintln!("Loading vocab from {}", vocab_path.display());
            Vocab::load(&vocab_path)?
        } else {
            eprintln!("Building vocab");
            let vocab = Vocab::build(
                train_dataset
                    .samples()
                    .iter()
                    .flat_map(|s| s.captions.iter().map(String::as_str)),
                spec.training.min_word_freq,
            );
            vocab.save(&vocab_path)?;
            vocab
        };

        let mut rng = RngState::seeded(spec.training.seed);
        let model = build_model(&spec.model, &vocab, &mut rng.model)?;

        Ok(Self::assemble(
            spec.clone(),
            model,
            rng,
            Arc::new(vocab),
            Arc::new(train_dataset),
            val_dataset,
            test_dataset,
            store,
        ))
    }

    /// Wire a trainer around an already-built model and datasets. This is
    /// the entry point for library users with their own architectures.
    #[allow(clippy::too_many_arguments)]
    pub fn with_model(
        spec: TrainSpec,
        model: Box<dyn CaptionModel>,
        vocab: Arc<Vocab>,
        train_dataset: Arc<CaptionDataset>,
        val_dataset: CaptionDataset,
        test_dataset: Option<CaptionDataset>,
    ) -> Result<Self> {
        let run_dir = spec.training.checkpoint_path.join(&spec.model.name);
        let store = CheckpointStore::new(&run_dir)?;
        let rng = RngState::seeded(spec.training.seed);
        Ok(Self::assemble(
            spec,
            model,
            rng,
            vocab,
            train_dataset,
            val_dataset,
            test_dataset,
            store,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        spec: TrainSpec,
        model: Box<dyn CaptionModel>,
        rng: RngState,
        vocab: Arc<Vocab>,
        train_dataset: Arc<CaptionDataset>,
        val_dataset: CaptionDataset,
        test_dataset: Option<CaptionDataset>,
        store: CheckpointStore,
    ) -> Self {
        let train_cider = Cider::new(&tokenize_map(&train_dataset.reference_map()));
        let scheduler = WarmupInverseSqrtLR::new(spec.model.d_model, spec.training.warmup);
        let policy = PhasePolicy::new(spec.training.patience);
        Self {
            spec,
            model,
            optimizer: Box::new(Adam::for_warmup()),
            scheduler,
            policy,
            rng,
            vocab,
            train_dataset,
            val_dataset,
            test_dataset,
            train_cider,
            store,
            epoch: 0,
            best_test_metric: 0.0,
            warned_degenerate_beam: false,
        }
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn phase(&self) -> Phase {
        self.policy.phase()
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn model_mut(&mut self) -> &mut dyn CaptionModel {
        self.model.as_mut()
    }

    /// Run until patience exhausts in the RL phase.
    ///
    /// With `resume`, the last checkpoint (if any) restores epoch, phase,
    /// patience, best metrics, RNG, model, optimizer, and scheduler. A
    /// missing or unreadable checkpoint is downgraded to a fresh start with
    /// a warning; resuming never fails fatally on the checkpoint itself.
    pub fn train(&mut self, resume: bool) -> Result<()> {
        if resume {
            self.try_resume();
        }

        loop {
            if let Some(cap) = self.spec.training.max_epochs {
                if self.epoch >= cap {
                    eprintln!("Reached max_epochs {cap}; stopping");
                    break;
                }
            }

            match self.policy.phase() {
                Phase::Supervised => self.train_xe()?,
                Phase::Reinforcement => self.train_scst()?,
            }

            let val_loss =
                evaluate_loss(self.model.as_mut(), &self.val_dataset, &self.vocab, self.spec.dataset.batch_size)?;
            let scores = evaluate_metrics(
                self.model.as_mut(),
                &self.val_dataset,
                &self.vocab,
                self.spec.training.evaluating_beam_size,
                self.spec.dataset.batch_size,
            )?;
            let val_metric = scores.get("CIDEr").copied().unwrap_or(0.0);
            eprintln!(
                "Epoch {}: val loss {:.4}, {}",
                self.epoch,
                val_loss,
                format_scores(&scores)
            );

            if let Some(test) = &self.test_dataset {
                let test_scores = evaluate_metrics(
                    self.model.as_mut(),
                    test,
                    &self.vocab,
                    self.spec.training.evaluating_beam_size,
                    self.spec.dataset.batch_size,
                )?;
                let test_metric = test_scores.get("CIDEr").copied().unwrap_or(0.0);
                self.best_test_metric = self.best_test_metric.max(test_metric);
                eprintln!("Epoch {}: test {}", self.epoch, format_scores(&test_scores));
            }

            let outcome = self.policy.observe(val_metric);

            if outcome.switched_to_rl {
                eprintln!("Patience exhausted; switching to self-critical training");
                if outcome.rollback_to_best {
                    match self.store.load_best()? {
                        Some(best) => {
                            let report = self.model.load_state_dict(&best.model);
                            if !report.is_clean() {
                                eprintln!(
                                    "Rollback restored partially (missing {:?}, unexpected {:?})",
                                    report.missing, report.unexpected
                                );
                            }
                            eprintln!("Rolled back model weights to epoch {}", best.epoch);
                        }
                        None => {
                            eprintln!("No best checkpoint to roll back to; keeping current weights");
                        }
                    }
                }
                self.optimizer =
                    Box::new(Adam::for_reinforcement(self.spec.training.rl_learning_rate));
            }

            self.save_checkpoint(val_loss, val_metric)?;
            if outcome.is_best {
                self.store.promote_to_best()?;
            }

            if outcome.stop {
                eprintln!("Patience exhausted in RL phase; stopping");
                break;
            }
            self.epoch += 1;
        }
        Ok(())
    }

    /// One supervised cross-entropy pass over the training set.
    fn train_xe(&mut self) -> Result<()> {
        let loader = PrefetchLoader::spawn(
            Arc::clone(&self.train_dataset),
            Arc::clone(&self.vocab),
            self.spec.dataset.batch_size,
            self.spec.dataset.workers,
            &mut self.rng.general,
        );
        let bar = progress_bar(
            loader.num_batches() as u64,
            &format!("Epoch {} - cross-entropy", self.epoch),
        );

        let params = self.model.params();
        let padding_idx = self.vocab.padding_idx();
        let mut running_loss = 0.0f64;
        let mut batches = 0usize;

        for batch in loader {
            self.model.zero_grad();
            let log_probs = self.model.forward(&batch.tokens, &batch.features);
            let (loss_sum, token_count) = token_nll(&log_probs, &batch.targets, padding_idx);
            if token_count == 0 {
                bar.inc(1);
                continue;
            }

            // dNLL/dlogp: -1/N at each non-padding target position.
            let mut grad = Array3::zeros(log_probs.dim());
            let scale = -1.0 / token_count as f32;
            for b in 0..batch.targets.nrows() {
                for t in 0..batch.targets.ncols() {
                    let target = batch.targets[[b, t]];
                    if target != padding_idx {
                        grad[[b, t, target]] = scale;
                    }
                }
            }
            self.model.backward(&grad);
            self.optimizer.step(&params);
            self.scheduler.step(self.optimizer.as_mut());

            running_loss += loss_sum / token_count as f64;
            batches += 1;
            bar.set_message(format!("loss {:.4}", running_loss / batches as f64));
            bar.inc(1);
        }
        bar.finish();
        Ok(())
    }

    /// One self-critical pass: beam-decode, reward against the cached
    /// training-corpus CIDEr, and push candidates above their sample
    /// baseline up.
    fn train_scst(&mut self) -> Result<()> {
        let beam = self.spec.training.training_beam_size;
        if beam == 1 && !self.warned_degenerate_beam {
            eprintln!(
                "Warning: training_beam_size is 1; the SCST baseline equals the reward and the gradient signal is zero"
            );
            self.warned_degenerate_beam = true;
        }

        // Beam candidates multiply memory, so shrink the batch accordingly.
        let scst_batch = (self.spec.dataset.batch_size / beam).max(1);
        let batches = self.train_dataset.eval_batches(scst_batch);
        let bar = progress_bar(
            batches.len() as u64,
            &format!("Epoch {} - self-critical", self.epoch),
        );

        let opts = BeamOptions {
            max_len: self.vocab.max_caption_length(),
            eos_idx: self.vocab.eos_idx(),
            beam_size: beam,
            out_size: beam,
        };
        let params = self.model.params();
        let mut running_loss = 0.0f64;
        let mut running_reward = 0.0f64;
        let mut count = 0usize;

        for batch in batches {
            let decoded = self.model.beam_search(&batch.features, &opts);
            self.model.zero_grad();

            let rewards = compute_rewards(
                &self.train_cider,
                &batch.ids,
                &decoded.sequences,
                &batch.references,
                &self.vocab,
            )?;
            let (loss, grad) = scst_loss_grad(&rewards, &decoded.log_probs);
            self.model.backward_beam(&grad);
            self.optimizer.step(&params);

            running_loss += f64::from(loss);
            running_reward += f64::from(rewards.mean().unwrap_or(0.0));
            count += 1;
            bar.set_message(format!(
                "loss {:.4} reward {:.3}",
                running_loss / count as f64,
                running_reward / count as f64
            ));
            bar.inc(1);
        }
        bar.finish();
        Ok(())
    }

    fn save_checkpoint(&self, val_loss: f64, val_metric: f64) -> Result<()> {
        let state = RunState {
            epoch: self.epoch,
            phase: self.policy.phase(),
            patience: self.policy.patience(),
            best_val_metric: self.policy.best_val_metric(),
            best_test_metric: self.best_test_metric,
            val_loss,
            val_metric,
            rng: self.rng.clone(),
            model: self.model.state_dict(),
            optimizer: self.optimizer.state(),
            scheduler: self.scheduler.clone(),
        };
        self.store.save_last(&state)
    }

    /// Restore from the last slot if one is readable; otherwise warn and
    /// start fresh. Never fatal, but a silent fresh start after an
    /// intended resume is a quality trap, hence the loud warnings.
    fn try_resume(&mut self) {
        match self.store.load_last() {
            Ok(Some(state)) => {
                eprintln!(
                    "Resuming from epoch {} (val loss {:.4}, best val CIDEr {:.4})",
                    state.epoch, state.val_loss, state.best_val_metric
                );
                self.restore(state);
            }
            Ok(None) => {
                eprintln!(
                    "Warning: resume requested but {} has no checkpoint; starting fresh",
                    self.store.dir().display()
                );
            }
            Err(e) => {
                eprintln!("Warning: ignoring unreadable checkpoint ({e}); starting fresh");
            }
        }
    }

    fn restore(&mut self, state: RunState) {
        // The snapshot records the last completed epoch; training resumes
        // after it.
        self.epoch = state.epoch + 1;
        self.policy = PhasePolicy::resume(
            state.phase,
            state.patience,
            state.best_val_metric,
            self.spec.training.patience,
        );
        self.best_test_metric = state.best_test_metric;
        self.rng = state.rng;

        let report = self.model.load_state_dict(&state.model);
        if !report.is_clean() {
            eprintln!(
                "Checkpoint restored partially (missing {:?}, unexpected {:?}, size mismatch {:?})",
                report.missing, report.unexpected, report.size_mismatch
            );
        }

        self.optimizer = match state.phase {
            Phase::Supervised => Box::new(Adam::for_warmup()),
            Phase::Reinforcement => {
                Box::new(Adam::for_reinforcement(self.spec.training.rl_learning_rate))
            }
        };
        self.optimizer.load_state(&state.optimizer);
        self.scheduler = state.scheduler;
    }
}

fn format_scores(scores: &BTreeMap<String, f64>) -> String {
    scores
        .iter()
        .map(|(name, value)| format!("{name} {value:.4}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn progress_bar(len: u64, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] {bar:30.cyan/blue} {pos}/{len} {msg}")
            .expect("valid template"),
    );
    bar.set_prefix(prefix.to_string());
    bar
}
