//! Sentence segmentation into retrieval units.
//!
//! Text is split on Unicode (UAX #29) sentence boundaries, which already keep
//! decimal numbers and lowercase continuations together. Splits that land
//! right after a common abbreviation ("Dr.", "e.g.", an initial) are merged
//! back. Each sentence is then tokenized on word boundaries, with clitics
//! split off the way a Treebank tokenizer does; stopwords and tokens that are
//! not purely alphanumeric are dropped, and the survivors are rejoined with
//! single spaces.

use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::stopwords::is_stopword;

/// Lowercase abbreviations, without their final period, after which a
/// sentence boundary is not trusted.
const ABBREVIATIONS: &[&str] = &[
    "approx", "capt", "cf", "co", "col", "corp", "dept", "dr", "e.g", "fig", "gen", "gov",
    "i.e", "inc", "jr", "lt", "ltd", "messrs", "mr", "mrs", "ms", "mt", "prof", "rev", "sen",
    "sgt", "sr", "st", "vol", "vs",
];

/// One normalized, sentence-derived snippet of text.
///
/// Units are immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetrievalUnit(String);

impl RetrievalUnit {
    /// The unit text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the unit, returning its text.
    pub fn into_string(self) -> String {
        self.0
    }

    /// The unit's tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ')
    }
}

impl fmt::Display for RetrievalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RetrievalUnit {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Configuration for the segmenter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Rejoin sentence splits that follow a known abbreviation or an initial.
    pub merge_abbreviations: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            merge_abbreviations: true,
        }
    }
}

/// Splits raw document text into retrieval units.
///
/// Segmentation is a pure function of the input text: the same text always
/// yields the same units in source order.
#[derive(Debug, Clone, Default)]
pub struct TextSegmenter {
    config: SegmenterConfig,
}

impl TextSegmenter {
    /// Create a segmenter with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a segmenter with custom configuration.
    pub fn with_config(config: SegmenterConfig) -> Self {
        Self { config }
    }

    /// Segment text into retrieval units, in source order.
    ///
    /// Sentences with no surviving tokens produce no unit.
    pub fn segment(&self, raw_text: &str) -> Vec<RetrievalUnit> {
        self.sentences(raw_text)
            .into_iter()
            .filter_map(normalize_sentence)
            .collect()
    }

    /// Split text into sentence spans.
    pub fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut sentences = Vec::new();
        let mut pending: Option<usize> = None;

        for (offset, piece) in text.split_sentence_bound_indices() {
            let start = pending.unwrap_or(offset);
            if self.config.merge_abbreviations && ends_with_abbreviation(piece) {
                pending = Some(start);
                continue;
            }
            pending = None;
            sentences.push(&text[start..offset + piece.len()]);
        }

        if let Some(start) = pending {
            sentences.push(&text[start..]);
        }

        sentences
    }
}

/// Clitics split off after an apostrophe, as in "car's" or "we're".
const CLITICS: &[&str] = &["d", "ll", "m", "re", "s", "t", "ve"];

/// Filter a sentence down to its content words.
fn normalize_sentence(sentence: &str) -> Option<RetrievalUnit> {
    let mut tokens: Vec<String> = Vec::new();
    for token in sentence.split_word_bounds() {
        content_words(token, &mut tokens);
    }

    if tokens.is_empty() {
        None
    } else {
        Some(RetrievalUnit(tokens.join(" ")))
    }
}

/// Push the content words of one word-bound token.
///
/// Word boundaries keep "Tesla's", "O'Neil" and "U.S" whole. Possessive and
/// contraction clitics are split off and dropped, other apostrophes split the
/// word in two, and dotted acronyms are closed up ("U.S" becomes "US").
fn content_words(token: &str, out: &mut Vec<String>) {
    if let Some((head, tail)) = token.split_once(['\'', '\u{2019}']) {
        let clitic = CLITICS.iter().any(|c| tail.eq_ignore_ascii_case(c));
        push_if_content(head, out);
        if !clitic {
            content_words(tail, out);
        }
    } else if token.contains('.') {
        let pieces: Vec<&str> = token.split('.').filter(|p| !p.is_empty()).collect();
        if pieces.len() > 1 && pieces.iter().all(|p| p.chars().all(char::is_alphabetic)) {
            push_if_content(&pieces.concat(), out);
        }
    } else {
        push_if_content(token, out);
    }
}

fn push_if_content(word: &str, out: &mut Vec<String>) {
    if is_content_token(word) {
        out.push(word.to_string());
    }
}

fn is_content_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(char::is_alphanumeric) && !is_stopword(token)
}

/// Whether a sentence span ends in something like "Dr." or "J." rather than
/// a real sentence terminator.
fn ends_with_abbreviation(piece: &str) -> bool {
    let trimmed = piece.trim_end();
    let Some(body) = trimmed.strip_suffix('.') else {
        return false;
    };

    let last_word = body
        .rsplit(char::is_whitespace)
        .next()
        .unwrap_or(body)
        .trim_start_matches(|c: char| !c.is_alphanumeric());

    let mut chars = last_word.chars();
    match (chars.next(), chars.next()) {
        (None, _) => false,
        // A lone capital is an initial, except the pronoun.
        (Some(c), None) => c.is_alphabetic() && c != 'I',
        _ => {
            let lower = last_word.to_lowercase();
            ABBREVIATIONS.contains(&lower.as_str())
        }
    }
}
