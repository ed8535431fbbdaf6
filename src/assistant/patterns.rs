//! Intent patterns
//!
//! A pattern pairs trigger words with the responses spoken when it wins.
//! Pattern 0 is reserved: it is chosen whenever nothing was understood.

use std::path::Path;

use serde::Deserialize;

use super::template::{NAME_PLACEHOLDER, placeholders};
use crate::{Error, Result};

/// Index of the "please repeat" pattern
pub const FALLBACK_PATTERN: usize = 0;

/// Trigger words and response templates for one intent
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntentPattern {
    /// Lowercase trigger words
    #[serde(default)]
    pub input: Vec<String>,

    /// Response templates, one picked at random
    pub output: Vec<String>,

    /// Spoken instead when an output template cannot be filled in
    #[serde(default)]
    pub error: Vec<String>,
}

impl IntentPattern {
    #[must_use]
    pub fn new(input: &[&str], output: &[&str], error: &[&str]) -> Self {
        let owned = |items: &[&str]| -> Vec<String> { items.iter().map(ToString::to_string).collect() };
        Self {
            input: owned(input),
            output: owned(output),
            error: owned(error),
        }
    }

    /// Lowercase and deduplicate trigger words, keeping declaration order
    fn normalize(&mut self) {
        let mut seen = Vec::with_capacity(self.input.len());
        for word in self.input.drain(..) {
            let word = word.trim().to_lowercase();
            if !word.is_empty() && !seen.contains(&word) {
                seen.push(word);
            }
        }
        self.input = seen;
    }
}

/// Schema of a patterns file
#[derive(Debug, Deserialize)]
struct PatternsFile {
    #[serde(rename = "pattern", default)]
    patterns: Vec<IntentPattern>,
}

/// The validated, read-only set of intent patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<IntentPattern>,
}

impl PatternSet {
    /// Build a pattern set, normalizing trigger words
    ///
    /// # Errors
    ///
    /// Returns error if the patterns fail validation
    pub fn new(mut patterns: Vec<IntentPattern>) -> Result<Self> {
        patterns.iter_mut().for_each(IntentPattern::normalize);
        let set = Self { patterns };
        set.validate()?;
        Ok(set)
    }

    /// Patterns shipped with the binary
    ///
    /// # Panics
    ///
    /// Never in practice: the built-in patterns are covered by tests
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(vec![
            IntentPattern::new(
                &[],
                &["Sorry, can you say again?", "Could you try speaking loudly, please."],
                &[],
            ),
            IntentPattern::new(&["hi", "hello"], &["Hi, what can i do for you", "Hello"], &[]),
            IntentPattern::new(&["name", "your"], &["My name is $Name", "I am $Name"], &[]),
            IntentPattern::new(
                &["temperature", "what", "what's"],
                &["The temperature is $Temperature centigrade"],
                &["Sorry, temperature information is not available now"],
            ),
            IntentPattern::new(
                &["humidity", "what", "what's"],
                &["The humidity is $Humidity%"],
                &["Sorry, humidity information is not available now"],
            ),
        ])
        .expect("built-in patterns are valid")
    }

    /// Parse patterns from TOML `[[pattern]]` tables
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or the patterns are invalid
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: PatternsFile = toml::from_str(content)?;
        Self::new(file.patterns)
    }

    /// Load patterns from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is invalid
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let set = Self::from_toml_str(&content)
            .map_err(|e| Error::Pattern(format!("{}: {e}", path.display())))?;
        tracing::info!(path = %path.display(), patterns = set.len(), "loaded intent patterns");
        Ok(set)
    }

    /// Reject configurations that would fail while answering
    fn validate(&self) -> Result<()> {
        if self.patterns.is_empty() {
            return Err(Error::Pattern("at least one pattern is required".to_string()));
        }

        for (index, pattern) in self.patterns.iter().enumerate() {
            if pattern.output.is_empty() {
                return Err(Error::Pattern(format!("pattern {index} has no output templates")));
            }

            let needs_fallback = pattern
                .output
                .iter()
                .flat_map(|t| placeholders(t))
                .any(|field| field != NAME_PLACEHOLDER);
            if needs_fallback && pattern.error.is_empty() {
                return Err(Error::Pattern(format!(
                    "pattern {index} uses device placeholders but has no error templates"
                )));
            }

            if let Some(field) = pattern
                .error
                .iter()
                .flat_map(|t| placeholders(t))
                .find(|field| *field != NAME_PLACEHOLDER)
            {
                return Err(Error::Pattern(format!(
                    "error template of pattern {index} uses ${field}; only $Name is allowed"
                )));
            }
        }

        Ok(())
    }

    /// All patterns in declaration order
    #[must_use]
    pub fn patterns(&self) -> &[IntentPattern] {
        &self.patterns
    }

    /// Pattern by index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&IntentPattern> {
        self.patterns.get(index)
    }

    /// Every trigger word once, in declaration order, for STT biasing
    #[must_use]
    pub fn phrase_hints(&self) -> Vec<String> {
        let mut hints: Vec<String> = Vec::new();
        for word in self.patterns.iter().flat_map(|p| &p.input) {
            if !hints.contains(word) {
                hints.push(word.clone());
            }
        }
        hints
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
