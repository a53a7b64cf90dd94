//! Inference over a dataset and submission export.

use crate::data::CaptionDataset;
use crate::error::{Error, Result};
use crate::eval::{check_alignment, collapse_repeats};
use crate::model::{BeamOptions, CaptionModel};
use crate::scorer::{compute_scores, tokenize_map};
use crate::vocab::Vocab;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One sample's inference output.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub image_id: String,
    pub filename: String,
    /// Generated captions, best first.
    pub captions: Vec<String>,
    /// Reference captions, when the dataset has them.
    pub references: Vec<String>,
    /// Per-sample metric table, when scoring was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<BTreeMap<String, f64>>,
}

/// Beam-decode every sample. References ride along for optional scoring
/// but are never consulted during generation.
pub fn get_predictions(
    model: &mut dyn CaptionModel,
    dataset: &CaptionDataset,
    vocab: &Vocab,
    beam_size: usize,
    batch_size: usize,
    with_scores: bool,
) -> Result<Vec<PredictionRecord>> {
    let opts = BeamOptions {
        max_len: vocab.max_caption_length(),
        eos_idx: vocab.eos_idx(),
        beam_size,
        out_size: 1,
    };

    let mut records = Vec::with_capacity(dataset.len());
    for batch in dataset.eval_batches(batch_size) {
        let decoded = model.beam_search(&batch.features, &opts);
        for (i, id) in batch.ids.iter().enumerate() {
            let words = vocab.decode_words(&decoded.sequences[i][0]);
            let caption = collapse_repeats(&words).join(" ");

            let scores = if with_scores {
                let mut gen = BTreeMap::new();
                let mut gts = BTreeMap::new();
                gen.insert(id.clone(), vec![caption.clone()]);
                gts.insert(id.clone(), batch.references[i].clone());
                check_alignment(&gen, &gts)?;
                Some(compute_scores(&tokenize_map(&gts), &tokenize_map(&gen)))
            } else {
                None
            };

            records.push(PredictionRecord {
                image_id: id.clone(),
                filename: batch.filenames[i].clone(),
                captions: vec![caption],
                references: batch.references[i].clone(),
                scores,
            });
        }
    }
    Ok(records)
}

/// Write prediction records as UTF-8 JSON (Vietnamese text stays readable,
/// never ASCII-escaped).
pub fn write_predictions(records: &[PredictionRecord], path: impl AsRef<Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(records)
        .map_err(|e| Error::Serialization(format!("predictions encode failed: {e}")))?;
    fs::write(path, json)?;
    Ok(())
}

pub fn read_predictions(path: impl AsRef<Path>) -> Result<Vec<PredictionRecord>> {
    let json = fs::read_to_string(path.as_ref())?;
    serde_json::from_str(&json).map_err(|e| {
        Error::Serialization(format!("predictions {}: {e}", path.as_ref().display()))
    })
}

/// Fill a submission template with generated captions.
///
/// The template is a JSON array of records with an `id` field; each record
/// whose id matches a prediction's filename gets a `captions` field with
/// the best generated caption. All other fields pass through untouched.
/// Returns how many template records were filled.
pub fn convert_results(
    template_path: impl AsRef<Path>,
    records: &[PredictionRecord],
    out_path: impl AsRef<Path>,
) -> Result<usize> {
    let json = fs::read_to_string(template_path.as_ref())?;
    let mut template: Vec<serde_json::Map<String, Value>> = serde_json::from_str(&json)
        .map_err(|e| {
            Error::Serialization(format!(
                "submission template {}: {e}",
                template_path.as_ref().display()
            ))
        })?;

    let by_filename: BTreeMap<&str, &PredictionRecord> =
        records.iter().map(|r| (r.filename.as_str(), r)).collect();

    let mut filled = 0usize;
    for item in &mut template {
        let Some(id) = item.get("id").and_then(Value::as_str) else { continue };
        if let Some(record) = by_filename.get(id) {
            let caption = record.captions.first().cloned().unwrap_or_default();
            item.insert("captions".to_string(), Value::String(caption));
            filled += 1;
        }
    }

    let out = serde_json::to_string_pretty(&template)
        .map_err(|e| Error::Serialization(format!("submission encode failed: {e}")))?;
    fs::write(out_path, out)?;
    Ok(filled)
}
