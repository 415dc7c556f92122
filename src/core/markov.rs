//! Markov chain phrase generator: training, generation, and serialization.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use thiserror::Error;

use crate::core::random::RandomSource;

#[derive(Debug, Error)]
pub enum MarkovError {
    #[error("markov order must be at least 1")]
    InvalidOrder,
    #[error("no data for generation (model was trained on no sentences)")]
    NoData,
    #[error("no training data for context {0:?}")]
    UnknownContext(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Special token marking sentence end.
const SENTENCE_END: &str = "</S>";

/// Training and generation knobs for one Markov model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkovSettings {
    /// Number of preceding tokens that form a context.
    pub order: usize,
    /// Outputs shorter than this are rejected by symbol resolution.
    pub min_characters: usize,
    /// A generation whose token characters exceed this is abandoned.
    pub max_characters: usize,
    /// Attempts made by symbol resolution before giving up.
    pub max_tries: usize,
    /// Reject outputs already produced for the same symbol.
    pub unique_output: bool,
}

impl Default for MarkovSettings {
    fn default() -> Self {
        Self {
            order: 2,
            min_characters: 0,
            max_characters: 100_000,
            max_tries: 100,
            unique_output: true,
        }
    }
}

impl MarkovSettings {
    /// Parse settings from RON. Missing fields keep their defaults.
    pub fn from_ron(input: &str) -> Result<MarkovSettings, MarkovError> {
        Ok(ron::from_str(input)?)
    }
}

/// A trained order-N token model.
///
/// Contexts are the `order` preceding tokens joined by a single space, left
/// padded with empty tokens at the start of a sentence. Successor lists keep
/// duplicates, so a uniform pick reproduces the observed frequencies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkovModel {
    settings: MarkovSettings,
    transitions: HashMap<String, Vec<String>>,
    sentence_count: usize,
}

impl MarkovModel {
    /// Train a model on whitespace-tokenized sentences.
    pub fn train<I, S>(sentences: I, settings: MarkovSettings) -> Result<MarkovModel, MarkovError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if settings.order == 0 {
            return Err(MarkovError::InvalidOrder);
        }
        let order = settings.order;

        let mut transitions: HashMap<String, Vec<String>> = HashMap::new();
        let mut sentence_count = 0;

        for sentence in sentences {
            let mut padded: Vec<&str> = vec![""; order];
            padded.extend(sentence.as_ref().split_whitespace());
            padded.push(SENTENCE_END);

            for window in padded.windows(order + 1) {
                let key = window[..order].join(" ");
                transitions
                    .entry(key)
                    .or_default()
                    .push(window[order].to_string());
            }
            sentence_count += 1;
        }

        log::debug!(
            "trained order-{} markov model: {} sentences, {} contexts",
            order,
            sentence_count,
            transitions.len()
        );

        Ok(MarkovModel {
            settings,
            transitions,
            sentence_count,
        })
    }

    /// Train on a text corpus with one sentence per non-blank line.
    pub fn train_text(text: &str, settings: MarkovSettings) -> Result<MarkovModel, MarkovError> {
        Self::train(
            text.lines().map(str::trim).filter(|line| !line.is_empty()),
            settings,
        )
    }

    pub fn settings(&self) -> &MarkovSettings {
        &self.settings
    }

    pub fn order(&self) -> usize {
        self.settings.order
    }

    pub fn sentence_count(&self) -> usize {
        self.sentence_count
    }

    pub fn context_count(&self) -> usize {
        self.transitions.len()
    }

    /// Observed successors of a context key.
    pub fn successors(&self, context: &str) -> Option<&[String]> {
        self.transitions.get(context).map(Vec::as_slice)
    }

    /// Walk the chain from a sentence start until the end token is drawn.
    ///
    /// Returns `Ok(None)` if the output grows past `max_characters`.
    pub fn generate(&self, random: &mut dyn RandomSource) -> Result<Option<String>, MarkovError> {
        if self.transitions.is_empty() {
            return Err(MarkovError::NoData);
        }

        let mut context: VecDeque<&str> = std::iter::repeat("").take(self.settings.order).collect();
        let mut words: Vec<&str> = Vec::new();
        let mut characters = 0usize;

        loop {
            let key = context.iter().copied().collect::<Vec<_>>().join(" ");
            let candidates = match self.transitions.get(&key) {
                Some(candidates) if !candidates.is_empty() => candidates,
                _ => return Err(MarkovError::UnknownContext(key)),
            };

            let next = candidates[random.index(candidates.len())].as_str();
            if next == SENTENCE_END {
                break;
            }

            characters += next.chars().count();
            if characters > self.settings.max_characters {
                log::trace!(
                    "markov generation abandoned after {} characters",
                    characters
                );
                return Ok(None);
            }

            words.push(next);
            context.pop_front();
            context.push_back(next);
        }

        Ok(Some(words.join(" ")))
    }
}

/// Save a MarkovModel to a RON file.
pub fn save_model(model: &MarkovModel, path: &Path) -> Result<(), MarkovError> {
    let serialized = ron::ser::to_string_pretty(model, ron::ser::PrettyConfig::default())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    std::fs::write(path, serialized)?;
    Ok(())
}

/// Load a MarkovModel from a RON file.
pub fn load_model(path: &Path) -> Result<MarkovModel, MarkovError> {
    let contents = std::fs::read_to_string(path)?;
    let model: MarkovModel = ron::from_str(&contents)?;
    Ok(model)
}
