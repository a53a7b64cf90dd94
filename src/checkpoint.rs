//! Run-state persistence.
//!
//! Two named slots per run directory: `last_model.json`, overwritten after
//! every epoch, and `best_model.json`, refreshed by an atomic copy of the
//! last slot whenever the validation metric improves. All writes go through
//! a temp-file-then-rename, so a crash mid-save can never corrupt the
//! previous valid snapshot.

use crate::error::{Error, Result};
use crate::model::StateDict;
use crate::optim::OptimizerState;
use crate::optim::WarmupInverseSqrtLR;
use crate::rng::RngState;
use crate::train::Phase;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Slot file overwritten after every epoch.
pub const LAST_SLOT: &str = "last_model.json";
/// Slot file refreshed only on validation-metric improvement.
pub const BEST_SLOT: &str = "best_model.json";

/// Full resumable snapshot of a training run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunState {
    /// Last completed epoch.
    pub epoch: usize,
    pub phase: Phase,
    pub patience: usize,
    pub best_val_metric: f64,
    pub best_test_metric: f64,
    /// Validation loss of the epoch that produced this snapshot.
    pub val_loss: f64,
    /// Validation metric (CIDEr) of the epoch that produced this snapshot.
    pub val_metric: f64,
    pub rng: RngState,
    pub model: StateDict,
    pub optimizer: OptimizerState,
    pub scheduler: WarmupInverseSqrtLR,
}

/// The two-slot on-disk store for one run.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Open (creating if needed) the run directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn last_path(&self) -> PathBuf {
        self.dir.join(LAST_SLOT)
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(BEST_SLOT)
    }

    /// Serialize into the last slot. Write-to-temp-then-rename: the slot
    /// either still holds the previous snapshot or holds the new one,
    /// never a torn write.
    pub fn save_last(&self, state: &RunState) -> Result<()> {
        let json = serde_json::to_string(state)
            .map_err(|e| Error::Serialization(format!("checkpoint encode failed: {e}")))?;
        let tmp = self.dir.join(format!(".{LAST_SLOT}.tmp"));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, self.last_path())?;
        Ok(())
    }

    /// Load a snapshot. Absence is a normal outcome (`Ok(None)`); a file
    /// that exists but does not decode is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<RunState>> {
        let path = path.as_ref();
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_str(&json).map_err(|e| Error::Checkpoint {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Some(state))
    }

    pub fn load_last(&self) -> Result<Option<RunState>> {
        Self::load(self.last_path())
    }

    pub fn load_best(&self) -> Result<Option<RunState>> {
        Self::load(self.best_path())
    }

    /// Atomically duplicate the last slot into the best slot.
    pub fn promote_to_best(&self) -> Result<()> {
        let tmp = self.dir.join(format!(".{BEST_SLOT}.tmp"));
        fs::copy(self.last_path(), &tmp)?;
        fs::rename(&tmp, self.best_path())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::{Adam, Optimizer};
    use std::collections::BTreeMap;

    fn run_state(epoch: usize) -> RunState {
        let mut model = BTreeMap::new();
        model.insert("decoder.weight".to_string(), vec![0.25f32, -1.5, 3.0]);
        RunState {
            epoch,
            phase: Phase::Supervised,
            patience: 2,
            best_val_metric: 0.71,
            best_test_metric: 0.64,
            val_loss: 1.9,
            val_metric: 0.68,
            rng: RngState::seeded(99),
            model,
            optimizer: Adam::for_warmup().state(),
            scheduler: WarmupInverseSqrtLR::new(512, 100),
        }
    }

    #[test]
    fn test_round_trip_preserves_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        let state = run_state(7);

        store.save_last(&state).unwrap();
        let loaded = store.load_last().unwrap().expect("slot written");

        assert_eq!(loaded.epoch, 7);
        assert_eq!(loaded.phase, Phase::Supervised);
        assert_eq!(loaded.patience, 2);
        assert_eq!(loaded.best_val_metric, 0.71);
        assert_eq!(loaded.best_test_metric, 0.64);
        assert_eq!(loaded.rng, state.rng);
        assert_eq!(loaded.model, state.model);
        assert_eq!(loaded.scheduler, state.scheduler);
    }

    #[test]
    fn test_missing_checkpoint_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        assert!(store.load_last().unwrap().is_none());
        assert!(store.load_best().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        fs::write(store.last_path(), "{ not a checkpoint").unwrap();

        let err = store.load_last().unwrap_err();
        assert!(matches!(err, Error::Checkpoint { .. }));
    }

    #[test]
    fn test_save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();

        store.save_last(&run_state(1)).unwrap();
        store.save_last(&run_state(2)).unwrap();

        let loaded = store.load_last().unwrap().unwrap();
        assert_eq!(loaded.epoch, 2);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();
        store.save_last(&run_state(1)).unwrap();
        store.promote_to_best().unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
    }

    #[test]
    fn test_promotion_copies_last_into_best() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();

        store.save_last(&run_state(4)).unwrap();
        store.promote_to_best().unwrap();
        // A later non-best epoch must not disturb the best slot.
        store.save_last(&run_state(5)).unwrap();

        let best = store.load_best().unwrap().unwrap();
        let last = store.load_last().unwrap().unwrap();
        assert_eq!(best.epoch, 4);
        assert_eq!(last.epoch, 5);
    }

    #[test]
    fn test_promotion_after_best_epoch_matches_last() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path()).unwrap();

        store.save_last(&run_state(9)).unwrap();
        store.promote_to_best().unwrap();

        let best = store.load_best().unwrap().unwrap();
        let last = store.load_last().unwrap().unwrap();
        assert_eq!(best.epoch, last.epoch);
    }

    #[test]
    fn test_store_creates_run_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("runs").join("baseline");
        let store = CheckpointStore::new(&nested).unwrap();
        assert!(nested.is_dir());
        store.save_last(&run_state(0)).unwrap();
        assert!(store.last_path().is_file());
    }
}
