//! Grammar tables: weighted rules, global variables, Markov symbols, and
//! modifier overrides.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::context::ExpansionContext;
use crate::core::expand::ExpandError;
use crate::core::lexeme::{parse_lexeme, ArgValue, Lexeme, SyntaxError, Variable};
use crate::core::markov::{MarkovError, MarkovModel, MarkovSettings};
use crate::core::modifiers::{FnModifier, Modifier};
use crate::core::random::RandomSource;

/// Nesting ceiling used when no [`ExpansionSettings`] are supplied.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 20;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("rule '{rule}' has invalid weight {weight} (weights must be finite and non-negative)")]
    InvalidWeight { rule: String, weight: f64 },
    #[error("template parse error: {0}")]
    Syntax(#[from] SyntaxError),
    #[error("markov error: {0}")]
    Markov(#[from] MarkovError),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Interpreter limits carried by a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionSettings {
    /// Lexeme nesting depth past which expansion fails.
    pub max_recursion_depth: usize,
}

impl Default for ExpansionSettings {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ExpansionSettings {
    /// Parse settings from RON. Missing fields keep their defaults.
    pub fn from_ron(input: &str) -> Result<ExpansionSettings, GrammarError> {
        Ok(ron::from_str(input)?)
    }
}

/// Identity of one rule alternative inside the grammar that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LexemeId(usize);

impl LexemeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One weighted alternative of a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedLexeme {
    pub id: LexemeId,
    pub weight: f64,
}

/// A named set of weighted alternatives.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    weighted_lexemes: Vec<WeightedLexeme>,
    total_weight: f64,
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weighted_lexemes(&self) -> &[WeightedLexeme] {
        &self.weighted_lexemes
    }

    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    pub fn len(&self) -> usize {
        self.weighted_lexemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weighted_lexemes.is_empty()
    }
}

/// A name bound to a trained Markov model.
#[derive(Debug, Clone)]
pub struct MarkovSymbol {
    pub name: String,
    pub model: MarkovModel,
}

/// Alternative source text plus its parse, filled on first use.
#[derive(Debug, Clone)]
struct Alternative {
    text: String,
    parsed: OnceCell<Lexeme>,
}

impl Alternative {
    fn lexeme(&self) -> Result<&Lexeme, SyntaxError> {
        self.parsed.get_or_try_init(|| parse_lexeme(&self.text))
    }
}

/// The read-only tables an expansion runs against.
///
/// Rule alternatives live in an arena owned by the grammar; a [`LexemeId`]
/// indexes that arena and is the identity uniqueness tracking works with.
/// A grammar is `Send + Sync` and can be shared by concurrent expansions,
/// each with its own random source.
#[derive(Clone, Default)]
pub struct Grammar {
    rules: HashMap<String, Rule>,
    alternatives: Vec<Alternative>,
    variables: Vec<Variable>,
    markov_symbols: HashMap<String, MarkovSymbol>,
    modifiers: HashMap<String, Arc<dyn Modifier>>,
    settings: ExpansionSettings,
}

impl Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a rule from `(text, weight)` pairs.
    ///
    /// Alternative text is not parsed until the alternative is first picked
    /// or [`Grammar::parse_all`] is called. Replacing a rule reuses the arena
    /// slots of its previous alternatives, so ids of a replaced rule refer to
    /// the new alternatives afterwards.
    pub fn add_rule<I, S>(&mut self, name: impl Into<String>, alternatives: I) -> Result<&Rule, GrammarError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let name = name.into();
        let alternatives: Vec<(String, f64)> = alternatives
            .into_iter()
            .map(|(text, weight)| (text.into(), weight))
            .collect();

        if let Some(&(_, weight)) = alternatives
            .iter()
            .find(|(_, w)| !w.is_finite() || *w < 0.0)
        {
            return Err(GrammarError::InvalidWeight { rule: name, weight });
        }

        let mut slots = self.released_slots(&name);
        let weighted_lexemes: Vec<WeightedLexeme> = alternatives
            .into_iter()
            .map(|(text, weight)| WeightedLexeme {
                id: self.store_alternative(slots.next(), text, OnceCell::new()),
                weight,
            })
            .collect();
        Ok(self.insert_rule(name, weighted_lexemes))
    }

    /// Add (or replace) a rule whose alternatives all weigh 1.
    pub fn add_rule_texts<I, S>(&mut self, name: impl Into<String>, texts: I) -> Result<&Rule, GrammarError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_rule(name, texts.into_iter().map(|text| (text, 1.0)))
    }

    /// Add a global variable. Globals are evaluated in insertion order at the
    /// start of every top-level expansion; re-adding a name replaces its value
    /// in place.
    pub fn add_variable(&mut self, name: impl Into<String>, text: &str) -> Result<(), GrammarError> {
        let variable = Variable {
            name: name.into(),
            lexeme: parse_lexeme(text)?,
        };
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => self.variables.push(variable),
        }
        Ok(())
    }

    /// Train a Markov model on `sentences` and bind it to `name`.
    pub fn add_markov_symbol<I, S>(
        &mut self,
        name: impl Into<String>,
        sentences: I,
        settings: MarkovSettings,
    ) -> Result<(), GrammarError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let model = MarkovModel::train(sentences, settings)?;
        self.insert_markov_model(name, model);
        Ok(())
    }

    /// Bind an already trained (or loaded) model to `name`.
    pub fn insert_markov_model(&mut self, name: impl Into<String>, model: MarkovModel) {
        let name = name.into();
        self.markov_symbols
            .insert(name.clone(), MarkovSymbol { name, model });
    }

    /// Register a modifier override. Overrides shadow built-ins of the same name.
    pub fn register_modifier<M>(&mut self, name: impl Into<String>, modifier: M)
    where
        M: Modifier + 'static,
    {
        self.modifiers.insert(name.into(), Arc::new(modifier));
    }

    /// Register a closure as a modifier override.
    pub fn register_modifier_fn<F>(&mut self, name: impl Into<String>, modifier: F)
    where
        F: Fn(&str, &[ArgValue], &mut ExpansionContext<'_>) -> Result<String, ExpandError>
            + Send
            + Sync
            + 'static,
    {
        self.register_modifier(name, FnModifier::new(modifier));
    }

    pub fn set_expansion_settings(&mut self, settings: ExpansionSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &ExpansionSettings {
        &self.settings
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Global variables in evaluation order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn markov_symbol(&self, name: &str) -> Option<&MarkovSymbol> {
        self.markov_symbols.get(name)
    }

    pub fn markov_symbols(&self) -> impl Iterator<Item = &MarkovSymbol> {
        self.markov_symbols.values()
    }

    /// The override registered under `name`, if any. Built-ins are not
    /// consulted here; see [`crate::core::modifiers::lookup`].
    pub fn modifier(&self, name: &str) -> Option<&dyn Modifier> {
        self.modifiers.get(name).map(|m| m.as_ref())
    }

    pub fn modifier_names(&self) -> impl Iterator<Item = &str> {
        self.modifiers.keys().map(String::as_str)
    }

    /// Source text of an alternative.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this grammar.
    pub fn alternative_text(&self, id: LexemeId) -> &str {
        &self.alternatives[id.0].text
    }

    /// Parsed form of an alternative, parsing it on first access.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this grammar.
    pub fn lexeme(&self, id: LexemeId) -> Result<&Lexeme, SyntaxError> {
        self.alternatives[id.0].lexeme()
    }

    /// Parse every rule alternative now instead of on first pick.
    pub fn parse_all(&self) -> Result<(), GrammarError> {
        for rule in self.rules.values() {
            for wl in &rule.weighted_lexemes {
                self.lexeme(wl.id)?;
            }
        }
        Ok(())
    }

    /// Fold `other` into this grammar. On name collisions the entries of
    /// `other` win; its alternatives are re-homed with fresh ids. The
    /// receiving grammar keeps its own expansion settings.
    pub fn merge(&mut self, other: Grammar) {
        let Grammar {
            rules,
            alternatives,
            variables,
            markov_symbols,
            modifiers,
            settings: _,
        } = other;

        let mut alternatives: Vec<Option<Alternative>> = alternatives.into_iter().map(Some).collect();
        for (name, rule) in rules {
            let mut slots = self.released_slots(&name);
            let mut weighted_lexemes = Vec::with_capacity(rule.weighted_lexemes.len());
            for wl in rule.weighted_lexemes {
                if let Some(alt) = alternatives.get_mut(wl.id.0).and_then(Option::take) {
                    let id = self.store_alternative(slots.next(), alt.text, alt.parsed);
                    weighted_lexemes.push(WeightedLexeme { id, weight: wl.weight });
                }
            }
            self.insert_rule(name, weighted_lexemes);
        }

        for variable in variables {
            match self.variables.iter_mut().find(|v| v.name == variable.name) {
                Some(existing) => *existing = variable,
                None => self.variables.push(variable),
            }
        }
        self.markov_symbols.extend(markov_symbols);
        self.modifiers.extend(modifiers);
    }

    /// Expand `text` against this grammar with a fresh context.
    pub fn expand(&self, text: &str, random: &mut dyn RandomSource) -> Result<String, ExpandError> {
        crate::core::expand::expand(self, text, random)
    }

    /// Arena slots held by the rule `name`, free for its replacement.
    fn released_slots(&self, name: &str) -> std::vec::IntoIter<LexemeId> {
        self.rules
            .get(name)
            .map(|rule| rule.weighted_lexemes.iter().map(|wl| wl.id).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
    }

    /// Store an alternative in `slot`, or in a new slot at the end of the arena.
    fn store_alternative(&mut self, slot: Option<LexemeId>, text: String, parsed: OnceCell<Lexeme>) -> LexemeId {
        let alternative = Alternative { text, parsed };
        match slot {
            Some(id) => {
                self.alternatives[id.0] = alternative;
                id
            }
            None => {
                let id = LexemeId(self.alternatives.len());
                self.alternatives.push(alternative);
                id
            }
        }
    }

    fn insert_rule(&mut self, name: String, weighted_lexemes: Vec<WeightedLexeme>) -> &Rule {
        let total_weight = weighted_lexemes.iter().map(|wl| wl.weight).sum();
        let rule = Rule {
            name: name.clone(),
            weighted_lexemes,
            total_weight,
        };
        self.rules.insert(name.clone(), rule);
        &self.rules[&name]
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rules: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        rules.sort_unstable();
        let variables: Vec<&str> = self.variables.iter().map(|v| v.name.as_str()).collect();
        let mut markov: Vec<&str> = self.markov_symbols.keys().map(String::as_str).collect();
        markov.sort_unstable();
        let mut modifiers: Vec<&str> = self.modifier_names().collect();
        modifiers.sort_unstable();

        f.debug_struct("Grammar")
            .field("rules", &rules)
            .field("alternatives", &self.alternatives.len())
            .field("variables", &variables)
            .field("markov_symbols", &markov)
            .field("modifiers", &modifiers)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::random::ScriptedRandom;

    #[test]
    fn add_rule_sums_weights() {
        let mut g = Grammar::new();
        let rule = g.add_rule("animal", [("cat", 1.0), ("dog", 2.5)]).unwrap();
        assert_eq!(rule.name(), "animal");
        assert_eq!(rule.len(), 2);
        assert_eq!(rule.total_weight(), 3.5);
        let id = rule.weighted_lexemes()[1].id;
        assert_eq!(g.alternative_text(id), "dog");
    }

    #[test]
    fn add_rule_texts_weighs_each_alternative_once() {
        let mut g = Grammar::new();
        let rule = g.add_rule_texts("n", ["a", "b", "c"]).unwrap();
        assert!(rule.weighted_lexemes().iter().all(|wl| wl.weight == 1.0));
        assert_eq!(rule.total_weight(), 3.0);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let mut g = Grammar::new();
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let err = g.add_rule("r", [("a", 1.0), ("b", bad)]).unwrap_err();
            assert!(matches!(err, GrammarError::InvalidWeight { ref rule, .. } if rule == "r"));
        }
        assert!(g.rule("r").is_none());
    }

    #[test]
    fn alternatives_parse_lazily() {
        let mut g = Grammar::new();
        let id = g.add_rule_texts("broken", ["{unclosed"]).unwrap().weighted_lexemes()[0].id;
        assert!(g.lexeme(id).is_err());
        assert!(matches!(g.parse_all(), Err(GrammarError::Syntax(_))));
    }

    #[test]
    fn lexeme_parse_is_cached() {
        let mut g = Grammar::new();
        let id = g.add_rule_texts("r", ["{a} {b}"]).unwrap().weighted_lexemes()[0].id;
        let first = g.lexeme(id).unwrap() as *const Lexeme;
        let second = g.lexeme(id).unwrap() as *const Lexeme;
        assert_eq!(first, second);
    }

    #[test]
    fn variables_keep_insertion_order_and_replace_in_place() {
        let mut g = Grammar::new();
        g.add_variable("first", "1").unwrap();
        g.add_variable("second", "2").unwrap();
        g.add_variable("first", "one").unwrap();

        let names: Vec<&str> = g.variables().iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(g.variable("first").unwrap().lexeme.original_string(), "one");
    }

    #[test]
    fn variable_text_is_parsed_eagerly() {
        let mut g = Grammar::new();
        assert!(matches!(g.add_variable("v", "{oops"), Err(GrammarError::Syntax(_))));
        assert!(g.variables().is_empty());
    }

    #[test]
    fn markov_symbol_is_trained() {
        let mut g = Grammar::new();
        g.add_markov_symbol("m", ["a b c"], MarkovSettings::default()).unwrap();
        let symbol = g.markov_symbol("m").unwrap();
        assert_eq!(symbol.name, "m");
        assert_eq!(symbol.model.sentence_count(), 1);
    }

    #[test]
    fn replacing_a_rule_reuses_its_arena_slots() {
        let mut g = Grammar::new();
        g.add_rule_texts("other", ["x"]).unwrap();
        for round in 0..50 {
            g.add_rule_texts("mood", [format!("calm {}", round), format!("wild {}", round)])
                .unwrap();
        }
        assert_eq!(g.alternatives.len(), 3);
        let mood = g.rule("mood").unwrap();
        assert_eq!(g.alternative_text(mood.weighted_lexemes()[1].id), "wild 49");
        assert_eq!(g.alternative_text(g.rule("other").unwrap().weighted_lexemes()[0].id), "x");

        g.add_rule_texts("mood", ["a", "b", "c"]).unwrap();
        assert_eq!(g.alternatives.len(), 4);

        let mut overlay = Grammar::new();
        overlay.add_rule_texts("mood", ["d"]).unwrap();
        g.merge(overlay);
        assert_eq!(g.alternatives.len(), 4);
        let mut random = ScriptedRandom::fixed(0.0);
        assert_eq!(g.expand("{mood}", &mut random).unwrap(), "d");
    }

    #[test]
    fn replaced_alternatives_are_parsed_afresh() {
        let mut g = Grammar::new();
        g.add_rule_texts("r", ["{old}"]).unwrap();
        g.parse_all().unwrap();
        g.add_rule_texts("r", ["new"]).unwrap();
        let id = g.rule("r").unwrap().weighted_lexemes()[0].id;
        assert!(g.lexeme(id).unwrap().expansions().is_empty());
    }

    #[test]
    fn merge_prefers_later_entries_and_rehomes_ids() {
        let mut base = Grammar::new();
        base.add_rule_texts("shared", ["base version"]).unwrap();
        base.add_rule_texts("base_only", ["only in base"]).unwrap();
        base.add_variable("v", "base").unwrap();

        let mut other = Grammar::new();
        other.add_rule("shared", [("override version", 2.0)]).unwrap();
        other.add_variable("v", "other").unwrap();
        other.add_variable("w", "new").unwrap();
        other.register_modifier_fn("shout", |v, _, _| Ok(v.to_uppercase()));

        base.merge(other);

        let shared = base.rule("shared").unwrap();
        assert_eq!(shared.total_weight(), 2.0);
        assert_eq!(base.alternative_text(shared.weighted_lexemes()[0].id), "override version");
        assert!(base.rule("base_only").is_some());
        assert_eq!(base.variable("v").unwrap().lexeme.original_string(), "other");
        assert_eq!(base.variables().len(), 2);
        assert!(base.modifier("shout").is_some());

        let mut random = ScriptedRandom::fixed(0.0);
        assert_eq!(base.expand("{shared.shout}", &mut random).unwrap(), "OVERRIDE VERSION");
    }

    #[test]
    fn expansion_settings_from_ron() {
        let settings = ExpansionSettings::from_ron("(max_recursion_depth: 5)").unwrap();
        assert_eq!(settings.max_recursion_depth, 5);
        assert_eq!(ExpansionSettings::from_ron("()").unwrap(), ExpansionSettings::default());
        assert!(ExpansionSettings::from_ron("(max_recursion_depth: \"x\")").is_err());
    }

    #[test]
    fn grammar_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Grammar>();
    }

    #[test]
    fn debug_lists_names() {
        let mut g = Grammar::new();
        g.add_rule_texts("noun", ["cat"]).unwrap();
        g.add_variable("hero", "Ann").unwrap();
        let debug = format!("{:?}", g);
        assert!(debug.contains("noun"));
        assert!(debug.contains("hero"));
    }
}
