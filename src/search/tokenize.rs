//! Text tokenization shared by indexing and querying.
//!
//! Words are found with Unicode word segmentation (UAX #29), so combining
//! marks such as Hebrew niqqud or Arabic harakat stay attached to their base
//! letters, and case is folded for scripts that have it. No stemming and no
//! stop words: the corpus mixes Hebrew, Aramaic and Judeo-Arabic, where
//! neither would be meaningful.

use ahash::AHashMap;
use std::collections::BTreeMap;
use unicode_segmentation::UnicodeSegmentation;

use super::index::{DocOrd, Posting};

/// Minimum token length for indexing. Single letters are kept because
/// abbreviations in the transcriptions are often one letter plus a geresh.
const MIN_TOKEN_LENGTH: usize = 1;

/// Tokens longer than this (in bytes) are noise such as runs of damage markers.
const MAX_TOKEN_LENGTH: usize = 256;

/// A normalized token with its byte span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub start: usize,
    pub end: usize,
    /// Ordinal of the token among the kept tokens of the text.
    pub position: u32,
}

/// Folds a word to its index form.
pub fn normalize(word: &str) -> String {
    word.to_lowercase()
}

/// Tokenizes text into normalized terms.
pub fn tokenize(text: &str) -> Vec<String> {
    tokenize_with_offsets(text)
        .into_iter()
        .map(|token| token.term)
        .collect()
}

/// Tokenizes text, keeping byte offsets for highlighting and positions for phrases.
pub fn tokenize_with_offsets(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0u32;

    for (start, word) in text.unicode_word_indices() {
        if word.len() < MIN_TOKEN_LENGTH || word.len() > MAX_TOKEN_LENGTH {
            continue;
        }
        tokens.push(Token {
            term: normalize(word),
            start,
            end: start + word.len(),
            position,
        });
        position += 1;
    }

    tokens
}

/// Accumulates postings for the documents of one batch.
#[derive(Debug, Default)]
pub(crate) struct TermBuilder {
    terms: BTreeMap<String, Vec<Posting>>,
}

impl TermBuilder {
    /// Indexes `text` under `doc` and returns the document length in tokens.
    ///
    /// Documents must be added in increasing `doc` order so posting lists stay sorted.
    pub(crate) fn add_document(&mut self, doc: DocOrd, text: &str) -> u32 {
        let tokens = tokenize_with_offsets(text);
        let length = tokens.len() as u32;

        let mut positions: AHashMap<String, Vec<u32>> = AHashMap::with_capacity(tokens.len());
        for token in tokens {
            positions.entry(token.term).or_default().push(token.position);
        }

        for (term, positions) in positions {
            self.terms
                .entry(term)
                .or_default()
                .push(Posting { doc, positions });
        }

        length
    }

    pub(crate) fn finalize(self) -> BTreeMap<String, Vec<Posting>> {
        self.terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;
    use rstest::rstest;

    #[rstest]
    #[case("hello world", &["hello", "world"])]
    #[case("Hello, World!", &["hello", "world"])]
    #[case("foo-bar baz", &["foo", "bar", "baz"])]
    #[case("IE104549337_P000001", &["ie104549337_p000001"])]
    #[case("אללסאן ממא ילי", &["אללסאן", "ממא", "ילי"])]
    #[case("דט'ר", &["דט'ר"])]
    #[case("כתב ר\"ת ז\"ל בזה", &["כתב", "ר\"ת", "ז\"ל", "בזה"])]
    #[case("]רת אללסאן [/", &["רת", "אללסאן"])]
    fn test_tokenize(#[case] input: &str, #[case] expected: &[&str]) {
        check!(tokenize(input) == expected);
    }

    #[test]
    fn test_combining_marks_stay_in_token() {
        // bet + dagesh + qamats, shin + shin dot + patah, tav
        let word = "\u{05D1}\u{05BC}\u{05B8}\u{05E9}\u{05C1}\u{05B7}\u{05EA}";
        let tokens = tokenize(word);
        check!(tokens.len() == 1);
        check!(tokens[0] == word);
    }

    #[test]
    fn test_case_folding_is_script_aware() {
        check!(tokenize("ΣΟΦΙΑ Straße") == vec!["σοφια".to_string(), "straße".to_string()]);
        check!(tokenize("שבת") == vec!["שבת".to_string()]);
    }

    #[test]
    fn test_offsets_point_into_source() {
        let text = "  שלום   world";
        for token in tokenize_with_offsets(text) {
            check!(normalize(&text[token.start..token.end]) == token.term);
        }
    }

    #[test]
    fn test_positions_are_consecutive() {
        let positions: Vec<u32> = tokenize_with_offsets("a, b; c")
            .iter()
            .map(|token| token.position)
            .collect();
        check!(positions == vec![0, 1, 2]);
    }

    #[test]
    fn test_empty_and_punctuation_only() {
        check!(tokenize("").is_empty());
        check!(tokenize("   \n\t").is_empty());
        check!(tokenize("][ ⟦ ⟧ / .").is_empty());
    }

    #[test]
    fn test_term_builder_collects_positions() {
        let mut builder = TermBuilder::default();
        check!(builder.add_document(0, "foo bar foo") == 3);
        check!(builder.add_document(1, "bar") == 1);
        let terms = builder.finalize();

        check!(terms["foo"] == vec![Posting { doc: 0, positions: vec![0, 2] }]);
        check!(terms["bar"].len() == 2);
        check!(terms["bar"][1].doc == 1);
    }
}
