//! Word-level vocabulary for caption token ids.
//!
//! Built once from the training captions and cached as JSON next to the
//! checkpoints, so repeated runs (and resumed runs) see identical token ids.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Padding token, always index 0.
pub const PAD_TOKEN: &str = "<pad>";
/// Begin-of-sequence token, always index 1.
pub const BOS_TOKEN: &str = "<bos>";
/// End-of-sequence token, always index 2.
pub const EOS_TOKEN: &str = "<eos>";
/// Unknown-word token, always index 3.
pub const UNK_TOKEN: &str = "<unk>";

#[derive(Serialize, Deserialize)]
struct VocabFile {
    words: Vec<String>,
    max_caption_length: usize,
}

/// Caption vocabulary: word <-> id mapping plus sequence-length bookkeeping.
#[derive(Clone, Debug)]
pub struct Vocab {
    words: Vec<String>,
    index: HashMap<String, usize>,
    max_caption_length: usize,
}

impl Vocab {
    /// Build from reference captions. Words below `min_freq` map to `<unk>`.
    /// `max_caption_length` covers the longest caption plus `<bos>`/`<eos>`.
    pub fn build<'a, I>(captions: I, min_freq: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        let mut max_words = 0usize;
        for caption in captions {
            let tokens: Vec<&str> = caption.split_whitespace().collect();
            max_words = max_words.max(tokens.len());
            for token in tokens {
                *freq.entry(token).or_insert(0) += 1;
            }
        }

        let mut kept: Vec<&str> = freq
            .iter()
            .filter(|(_, &count)| count >= min_freq.max(1))
            .map(|(&word, _)| word)
            .collect();
        // Deterministic ids regardless of hash-map iteration order.
        kept.sort_unstable();

        let mut words: Vec<String> =
            vec![PAD_TOKEN.into(), BOS_TOKEN.into(), EOS_TOKEN.into(), UNK_TOKEN.into()];
        words.extend(kept.into_iter().map(String::from));

        Self::from_words(words, max_words + 2)
    }

    fn from_words(words: Vec<String>, max_caption_length: usize) -> Self {
        let index = words
            .iter()
            .enumerate()
            .map(|(i, w)| (w.clone(), i))
            .collect();
        Self { words, index, max_caption_length }
    }

    pub fn padding_idx(&self) -> usize {
        0
    }

    pub fn bos_idx(&self) -> usize {
        1
    }

    pub fn eos_idx(&self) -> usize {
        2
    }

    pub fn unk_idx(&self) -> usize {
        3
    }

    /// Longest encoded caption, `<bos>`/`<eos>` included.
    pub fn max_caption_length(&self) -> usize {
        self.max_caption_length
    }

    /// Vocabulary size, specials included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn word(&self, id: usize) -> Option<&str> {
        self.words.get(id).map(String::as_str)
    }

    /// Whitespace-tokenized caption to word ids, unknown words mapped to
    /// `<unk>`. No `<bos>`/`<eos>` here; batching adds them.
    pub fn encode_caption(&self, caption: &str) -> Vec<usize> {
        caption
            .split_whitespace()
            .map(|w| self.index.get(w).copied().unwrap_or(self.unk_idx()))
            .collect()
    }

    /// Ids back to words, stopping at `<eos>` and skipping specials.
    pub fn decode_words(&self, ids: &[usize]) -> Vec<String> {
        let mut out = Vec::new();
        for &id in ids {
            if id == self.eos_idx() {
                break;
            }
            if id == self.padding_idx() || id == self.bos_idx() {
                continue;
            }
            match self.words.get(id) {
                Some(w) => out.push(w.clone()),
                None => out.push(UNK_TOKEN.into()),
            }
        }
        out
    }

    /// Ids to a space-joined caption string.
    pub fn decode_caption(&self, ids: &[usize]) -> String {
        self.decode_words(ids).join(" ")
    }

    /// Persist as JSON. Word order is the id order, so a reloaded
    /// vocabulary assigns identical ids.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = VocabFile {
            words: self.words.clone(),
            max_caption_length: self.max_caption_length,
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| Error::Serialization(format!("vocab encode failed: {e}")))?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        let file: VocabFile = serde_json::from_str(&json)
            .map_err(|e| Error::Serialization(format!("vocab decode failed: {e}")))?;
        if file.words.len() < 4 || file.words[0] != PAD_TOKEN {
            return Err(Error::Data(format!(
                "vocab file {} lacks the special-token prefix",
                path.as_ref().display()
            )));
        }
        Ok(Self::from_words(file.words, file.max_caption_length))
    }
}
