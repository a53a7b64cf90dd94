//! End-to-end pipeline: config from YAML, datasets from JSON, training with
//! checkpointing, resume, prediction, and submission export.

use std::fs;
use std::path::Path;
use viecap::config::load_config;
use viecap::predict::{convert_results, get_predictions};
use viecap::train::Trainer;

fn write_dataset(path: &Path) {
    fs::write(
        path,
        r#"[
            {"image_id": "im_0", "filename": "im_0.jpg", "features": [1.0, 0.0],
             "captions": ["một con chó đang chạy", "con chó chạy trên sân"]},
            {"image_id": "im_1", "filename": "im_1.jpg", "features": [0.0, 1.0],
             "captions": ["một con mèo nằm ngủ"]},
            {"image_id": "im_2", "filename": "im_2.jpg", "features": [0.5, 0.5],
             "captions": ["hai con chim đang bay"]}
        ]"#,
    )
    .unwrap();
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let config_path = dir.join("config.yaml");
    fs::write(
        &config_path,
        format!(
            r#"
model:
  name: pipeline-test
  variant: linear
  feature_dim: 2
  d_model: 16
dataset:
  train: {dir}/train.json
  val: {dir}/val.json
  batch_size: 2
  workers: 1
training:
  checkpoint_path: {dir}/runs
  seed: 11
  warmup: 4
  patience: 1
  training_beam_size: 2
  evaluating_beam_size: 2
  max_epochs: 2
"#,
            dir = dir.display()
        ),
    )
    .unwrap();
    config_path
}

#[test]
fn full_pipeline_train_resume_predict_convert() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(&dir.path().join("train.json"));
    write_dataset(&dir.path().join("val.json"));
    let config_path = write_config(dir.path());

    let spec = load_config(&config_path).unwrap();
    let run_dir = dir.path().join("runs").join("pipeline-test");

    // Fresh training run, capped at two epochs.
    let mut trainer = Trainer::from_spec(&spec).unwrap();
    trainer.train(false).unwrap();

    assert!(run_dir.join("vocab.json").is_file());
    assert!(run_dir.join("last_model.json").is_file());
    assert!(run_dir.join("best_model.json").is_file());

    // A second process resumes from the last slot and, already at the
    // epoch cap, stops straight away with state intact.
    let mut resumed = Trainer::from_spec(&spec).unwrap();
    resumed.train(true).unwrap();
    assert!(resumed.epoch() >= 2);

    // Predict over the validation split with the trained weights.
    let records = get_predictions(
        resumed.model_mut(),
        &viecap::data::CaptionDataset::from_json_file(dir.path().join("val.json")).unwrap(),
        &viecap::Vocab::load(run_dir.join("vocab.json")).unwrap(),
        2,
        2,
        true,
    )
    .unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.scores.is_some()));

    // Merge into a submission template; untouched fields must survive and
    // Vietnamese text must stay unescaped on disk.
    let template = dir.path().join("template.json");
    fs::write(
        &template,
        r#"[
            {"id": "im_0.jpg", "split": "public"},
            {"id": "im_2.jpg", "split": "public"}
        ]"#,
    )
    .unwrap();
    let submission = dir.path().join("submission.json");
    let filled = convert_results(&template, &records, &submission).unwrap();
    assert_eq!(filled, 2);

    let raw = fs::read_to_string(&submission).unwrap();
    assert!(raw.contains("captions"));
    assert!(raw.contains("public"));
    assert!(!raw.contains("\\u"));
}

#[test]
fn vocab_is_cached_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(&dir.path().join("train.json"));
    write_dataset(&dir.path().join("val.json"));
    let config_path = write_config(dir.path());
    let spec = load_config(&config_path).unwrap();

    let _ = Trainer::from_spec(&spec).unwrap();
    let vocab_path = dir.path().join("runs").join("pipeline-test").join("vocab.json");
    let first = fs::read_to_string(&vocab_path).unwrap();

    // A second construction must load, not rebuild, the vocabulary.
    let _ = Trainer::from_spec(&spec).unwrap();
    let second = fs::read_to_string(&vocab_path).unwrap();
    assert_eq!(first, second);
}
