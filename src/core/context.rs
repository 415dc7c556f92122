//! Per-expansion state: scope stack, recursion depth, and uniqueness trackers.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::grammar::{Grammar, LexemeId, Rule};
use crate::core::random::RandomSource;

/// Mutable state for one top-level expansion and everything it triggers,
/// including re-entrant expansions requested by modifiers.
///
/// The grammar is only borrowed; many contexts may expand against one
/// grammar at the same time, each with its own random source.
pub struct ExpansionContext<'a> {
    pub(crate) grammar: &'a Grammar,
    pub(crate) random: &'a mut dyn RandomSource,
    pub(crate) depth: usize,
    /// Innermost layer last. The bottom layer holds globals during a
    /// top-level expansion.
    pub(crate) scopes: Vec<FxHashMap<String, String>>,
    pub(crate) trackers: Vec<FxHashSet<LexemeId>>,
    /// Markov outputs already accepted, per symbol.
    pub(crate) markov_outputs: FxHashMap<String, FxHashSet<String>>,
    pub(crate) globals_loaded: bool,
}

impl<'a> ExpansionContext<'a> {
    pub fn new(grammar: &'a Grammar, random: &'a mut dyn RandomSource) -> Self {
        Self {
            grammar,
            random,
            depth: 0,
            scopes: Vec::new(),
            trackers: Vec::new(),
            markov_outputs: FxHashMap::default(),
            globals_loaded: false,
        }
    }

    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }

    pub fn random(&mut self) -> &mut (dyn RandomSource + 'a) {
        &mut *self.random
    }

    /// Current lexeme nesting depth. Zero outside of any lexeme.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Resolve `name` against the scope stack, innermost layer first.
    pub fn lookup_variable(&self, name: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map(String::as_str)
    }

    pub fn is_tracking(&self) -> bool {
        !self.trackers.is_empty()
    }

    /// Whether any active tracker has recorded `id`.
    pub fn is_seen(&self, id: LexemeId) -> bool {
        self.trackers.iter().any(|tracker| tracker.contains(&id))
    }

    /// Union of every active tracker.
    pub fn seen_lexemes(&self) -> FxHashSet<LexemeId> {
        let mut seen = FxHashSet::default();
        for tracker in &self.trackers {
            seen.extend(tracker.iter().copied());
        }
        seen
    }

    /// Whether `rule` still has a pickable alternative no tracker has seen.
    pub fn has_unseen(&self, rule: &Rule) -> bool {
        rule.weighted_lexemes()
            .iter()
            .any(|wl| wl.weight > 0.0 && !self.is_seen(wl.id))
    }

    pub(crate) fn mark_seen(&mut self, id: LexemeId) {
        for tracker in &mut self.trackers {
            tracker.insert(id);
        }
    }

    pub fn push_tracker(&mut self) {
        self.trackers.push(FxHashSet::default());
    }

    pub fn pop_tracker(&mut self) {
        self.trackers.pop();
    }

    /// Run `f` with a fresh uniqueness tracker that is removed afterwards,
    /// whether `f` succeeds or not.
    pub fn with_uniqueness<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        self.push_tracker();
        let result = f(self);
        self.pop_tracker();
        result
    }
}
