//! Caption tokenization for scoring.
//!
//! PTB-flavored: lowercase, strip punctuation, split on whitespace. Unicode
//! alphanumerics pass through untouched, so Vietnamese diacritics survive.
//! The map form runs across a rayon pool; results are keyed by sample id,
//! so completion order is irrelevant.

use rayon::prelude::*;
use std::collections::BTreeMap;

use super::TokenMap;

/// Tokenize one caption.
pub fn word_tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .filter_map(|raw| {
            let word: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if word.is_empty() {
                None
            } else {
                Some(word)
            }
        })
        .collect()
}

/// Tokenize an id-keyed caption map in parallel.
pub fn tokenize_map(captions: &BTreeMap<String, Vec<String>>) -> TokenMap {
    captions
        .iter()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|(id, texts)| {
            let tokenized = texts.iter().map(|t| word_tokenize(t)).collect();
            (id.clone(), tokenized)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_and_strips_punctuation() {
        assert_eq!(
            word_tokenize("Một con Chó, đang chạy!"),
            vec!["một", "con", "chó", "đang", "chạy"]
        );
    }

    #[test]
    fn test_drops_pure_punctuation_tokens() {
        assert_eq!(word_tokenize("chó ... mèo"), vec!["chó", "mèo"]);
    }

    #[test]
    fn test_keeps_digits() {
        assert_eq!(word_tokenize("2 con chó"), vec!["2", "con", "chó"]);
    }

    #[test]
    fn test_tokenize_map_keys_preserved() {
        let mut captions = BTreeMap::new();
        captions.insert("z".to_string(), vec!["Con Mèo.".to_string()]);
        captions.insert("a".to_string(), vec!["chó".to_string(), "Chó chạy".to_string()]);

        let tokens = tokenize_map(&captions);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["z"], vec![vec!["con".to_string(), "mèo".to_string()]]);
        assert_eq!(tokens["a"].len(), 2);
    }
}
