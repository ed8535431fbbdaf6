//! Keyword scoring of transcripts against intent patterns

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::patterns::{FALLBACK_PATTERN, PatternSet};

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\w+\b").expect("valid regex"));

/// Lowercased set of the words in a transcript
#[must_use]
pub fn tokenize(transcript: &str) -> HashSet<String> {
    WORD.find_iter(transcript)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Number of trigger words present among the tokens
#[must_use]
pub fn score(triggers: &[String], tokens: &HashSet<String>) -> usize {
    triggers.iter().filter(|w| tokens.contains(*w)).count()
}

/// Score of every pattern, in declaration order
#[must_use]
pub fn scores(patterns: &PatternSet, tokens: &HashSet<String>) -> Vec<usize> {
    patterns
        .patterns()
        .iter()
        .map(|p| score(&p.input, tokens))
        .collect()
}

/// Index of the best-matching pattern
///
/// Ties go to the earliest pattern. No transcript, or one that matches
/// nothing, selects the fallback pattern.
#[must_use]
pub fn select_pattern(patterns: &PatternSet, transcript: Option<&str>) -> usize {
    let Some(transcript) = transcript.filter(|t| !t.trim().is_empty()) else {
        return FALLBACK_PATTERN;
    };

    let tokens = tokenize(transcript);
    let mut best = FALLBACK_PATTERN;
    let mut best_score = 0;

    for (index, value) in scores(patterns, &tokens).into_iter().enumerate() {
        if value > best_score {
            best = index;
            best_score = value;
        }
    }

    tracing::debug!(transcript, pattern = best, score = best_score, "pattern selected");
    best
}
