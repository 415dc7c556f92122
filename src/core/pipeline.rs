//! A seeded front end over a grammar: build once, generate many times.
//!
//! Each call derives its random stream from the builder seed and the number
//! of generations so far, so an identically built generator replays the same
//! sequence of outputs.

use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::core::expand::ExpandError;
use crate::core::grammar::{ExpansionSettings, Grammar, GrammarError};
use crate::core::markov::{MarkovError, MarkovModel};
use crate::core::random::SeededRandom;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarError),
    #[error("expansion error: {0}")]
    Expand(#[from] ExpandError),
    #[error("markov error: {0}")]
    Markov(#[from] MarkovError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns a grammar and the seed its expansions are drawn from. Built via
/// `Generator::builder()`.
#[derive(Debug)]
pub struct Generator {
    grammar: Grammar,
    seed: u64,
    generation_count: u64,
}

/// Builder for constructing a `Generator`.
pub struct GeneratorBuilder {
    seed: u64,
    grammar: Option<Grammar>,
    markov_models_dir: Option<String>,
    markov_models: Option<HashMap<String, MarkovModel>>,
    settings: Option<ExpansionSettings>,
}

impl Generator {
    pub fn builder() -> GeneratorBuilder {
        GeneratorBuilder {
            seed: 0,
            grammar: None,
            markov_models_dir: None,
            markov_models: None,
            settings: None,
        }
    }

    /// Expand `text` once.
    pub fn generate(&mut self, text: &str) -> Result<String, GeneratorError> {
        let mut random = SeededRandom::from_seed(self.seed.wrapping_add(self.generation_count));
        let output = self.grammar.expand(text, &mut random)?;
        self.generation_count += 1;
        Ok(output)
    }

    /// Expand `text` `count` times, each with its own random stream.
    pub fn generate_variants(&mut self, text: &str, count: usize) -> Result<Vec<String>, GeneratorError> {
        let mut results = Vec::with_capacity(count);
        for _ in 0..count {
            results.push(self.generate(text)?);
        }
        Ok(results)
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn grammar_mut(&mut self) -> &mut Grammar {
        &mut self.grammar
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of successful generations so far.
    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }
}

impl GeneratorBuilder {
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn grammar(mut self, grammar: Grammar) -> Self {
        self.grammar = Some(grammar);
        self
    }

    /// Load every `.ron` Markov model in `path` as a symbol named after the
    /// file stem.
    pub fn markov_models_dir(mut self, path: &str) -> Self {
        self.markov_models_dir = Some(path.to_string());
        self
    }

    /// Provide Markov models directly (without files).
    pub fn with_markov_models(mut self, models: HashMap<String, MarkovModel>) -> Self {
        self.markov_models = Some(models);
        self
    }

    pub fn expansion_settings(mut self, settings: ExpansionSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<Generator, GeneratorError> {
        let mut grammar = self.grammar.unwrap_or_default();

        if let Some(ref dir) = self.markov_models_dir {
            if Path::new(dir).exists() {
                load_ron_files_from_dir(dir, |path| {
                    let model = crate::core::markov::load_model(path)?;
                    let name = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or("unknown")
                        .to_string();
                    log::debug!("loaded markov model '{}' from {}", name, path.display());
                    grammar.insert_markov_model(name, model);
                    Ok(())
                })?;
            } else {
                log::warn!("markov model directory '{}' does not exist", dir);
            }
        }

        // Directly provided models override those loaded from disk
        for (name, model) in self.markov_models.unwrap_or_default() {
            grammar.insert_markov_model(name, model);
        }

        if let Some(settings) = self.settings {
            grammar.set_expansion_settings(settings);
        }

        Ok(Generator {
            grammar,
            seed: self.seed,
            generation_count: 0,
        })
    }
}

/// Load all .ron files from a directory, calling `loader` for each.
fn load_ron_files_from_dir<F>(dir: &str, mut loader: F) -> Result<(), GeneratorError>
where
    F: FnMut(&Path) -> Result<(), GeneratorError>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    paths.sort();
    for path in &paths {
        loader(path)?;
    }
    Ok(())
}
