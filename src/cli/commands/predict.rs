//! Predict command: decode a dataset from a trained checkpoint.

use crate::checkpoint::CheckpointStore;
use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::load_config;
use crate::data::CaptionDataset;
use crate::error::{Error, Result};
use crate::model::build_model;
use crate::predict::{get_predictions, write_predictions};
use crate::rng::RngState;
use crate::vocab::Vocab;
use std::path::{Path, PathBuf};

pub fn run_predict(
    config: &Path,
    dataset: Option<&Path>,
    checkpoint: Option<&Path>,
    output: &Path,
    scores: bool,
    level: LogLevel,
) -> Result<()> {
    let spec = load_config(config)?;
    let run_dir = spec.training.checkpoint_path.join(&spec.model.name);

    let dataset_path: PathBuf = match dataset {
        Some(path) => path.to_path_buf(),
        None => spec.dataset.test.clone().unwrap_or_else(|| spec.dataset.val.clone()),
    };
    let dataset = CaptionDataset::from_json_file(&dataset_path)?;
    log(
        level,
        LogLevel::Normal,
        &format!("Predicting over {} ({} samples)", dataset_path.display(), dataset.len()),
    );

    let vocab_path = run_dir.join("vocab.json");
    if !vocab_path.is_file() {
        return Err(Error::Config(format!(
            "no vocabulary at {}; train this run first",
            vocab_path.display()
        )));
    }
    let vocab = Vocab::load(&vocab_path)?;

    // Model weights come from the requested checkpoint, or the run's best
    // slot, or its last slot, in that order of preference.
    let store = CheckpointStore::new(&run_dir)?;
    let state = match checkpoint {
        Some(path) => CheckpointStore::load(path)?.ok_or_else(|| Error::Config(format!(
            "checkpoint {} does not exist",
            path.display()
        )))?,
        None => match store.load_best()? {
            Some(state) => state,
            None => store.load_last()?.ok_or_else(|| {
                Error::Config(format!("no checkpoint in {}; train first", run_dir.display()))
            })?,
        },
    };
    log(
        level,
        LogLevel::Verbose,
        &format!("  Loaded checkpoint from epoch {}", state.epoch),
    );

    let mut rng = RngState::seeded(spec.training.seed);
    let mut model = build_model(&spec.model, &vocab, &mut rng.model)?;
    let report = model.load_state_dict(&state.model);
    if !report.is_clean() {
        log(
            level,
            LogLevel::Normal,
            &format!(
                "Warning: checkpoint loaded partially (missing {:?}, unexpected {:?})",
                report.missing, report.unexpected
            ),
        );
    }

    let records = get_predictions(
        model.as_mut(),
        &dataset,
        &vocab,
        spec.training.evaluating_beam_size,
        spec.dataset.batch_size,
        scores,
    )?;
    write_predictions(&records, output)?;
    log(
        level,
        LogLevel::Normal,
        &format!("Wrote {} prediction(s) to {}", records.len(), output.display()),
    );
    Ok(())
}
