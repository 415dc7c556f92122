//! The expansion interpreter.
//!
//! A lexeme is expanded by pushing a scope layer, evaluating its local
//! variables in order, resolving each expansion, piping the result through
//! its modifier chain, and substituting the values into the format string.
//!
//! Symbol resolution order: scope stack (innermost first), Markov symbols,
//! rules. An unresolved non-empty name is an error; the empty name of a
//! modifier-only expansion resolves to `""`.
//!
//! While a uniqueness tracker is active, rule picks exclude alternatives any
//! tracker has seen, and an expansion that cannot produce anything new yields
//! `None` to its caller instead of a string.

use log::{debug, warn};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::core::context::ExpansionContext;
use crate::core::grammar::{Grammar, LexemeId, MarkovSymbol, Rule};
use crate::core::lexeme::{parse_lexeme, Expansion, Lexeme, SyntaxError};
use crate::core::markov::MarkovError;
use crate::core::modifiers::apply_modifier;
use crate::core::random::RandomSource;
use crate::core::select;

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("expansion of '{0}' failed: no variable, rule, or markov symbol with that name")]
    UnknownSymbol(String),
    #[error("unrecognized modifier '{0}'")]
    UnrecognizedModifier(String),
    #[error("recursion limit of {limit} exceeded while expanding {text:?}")]
    RecursionLimitExceeded { limit: usize, text: String },
    #[error("modifier '{modifier}': {reason}")]
    ModifierArguments { modifier: String, reason: String },
    #[error("modifier '{modifier}' references unknown rule '{rule}'")]
    UnknownRule { modifier: String, rule: String },
    #[error("markov error: {0}")]
    Markov(#[from] MarkovError),
}

/// Expand `text` against `grammar` in a fresh context.
pub fn expand(grammar: &Grammar, text: &str, random: &mut dyn RandomSource) -> Result<String, ExpandError> {
    ExpansionContext::new(grammar, random).expand(text)
}

/// A resolved symbol and whether it can still produce something new under
/// uniqueness tracking.
struct Resolved {
    value: String,
    live: bool,
}

impl Resolved {
    fn fixed(value: String) -> Self {
        Self { value, live: false }
    }
}

impl<'a> ExpansionContext<'a> {
    /// Parse and expand `text`.
    ///
    /// The outermost call evaluates the grammar's globals first. Calls made
    /// from inside a running expansion (by a modifier, say) reuse the current
    /// scope stack and trackers. Exhaustion under tracking expands to `""`.
    pub fn expand(&mut self, text: &str) -> Result<String, ExpandError> {
        let lexeme = parse_lexeme(text)?;
        Ok(self.expand_lexeme(&lexeme)?.unwrap_or_default())
    }

    /// Expand an already parsed lexeme. See [`ExpansionContext::expand`].
    pub fn expand_lexeme(&mut self, lexeme: &Lexeme) -> Result<Option<String>, ExpandError> {
        self.with_globals(|ctx| ctx.evaluate_lexeme(lexeme, None))
    }

    /// Pick an alternative of the rule called `name` and expand it.
    ///
    /// Under uniqueness tracking, seen alternatives are excluded and `None`
    /// signals that nothing new is left. Like [`ExpansionContext::expand`], an
    /// outermost call evaluates the grammar's globals first.
    pub fn expand_rule(&mut self, name: &str) -> Result<Option<String>, ExpandError> {
        let grammar = self.grammar;
        let rule = grammar
            .rule(name)
            .ok_or_else(|| ExpandError::UnknownSymbol(name.to_string()))?;
        self.with_globals(|ctx| ctx.expand_rule_entry(rule))
    }

    /// Run `f` with the globals layer at the bottom of the scope stack,
    /// loading it first unless an enclosing call already has.
    fn with_globals<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ExpandError>,
    ) -> Result<T, ExpandError> {
        if self.globals_loaded {
            return f(self);
        }

        self.globals_loaded = true;
        self.scopes.push(FxHashMap::default());
        let result = match self.load_globals() {
            Ok(()) => f(self),
            Err(e) => Err(e),
        };
        self.scopes.pop();
        self.globals_loaded = false;
        result
    }

    fn load_globals(&mut self) -> Result<(), ExpandError> {
        let grammar = self.grammar;
        for variable in grammar.variables() {
            let value = self
                .evaluate_lexeme(&variable.lexeme, None)?
                .unwrap_or_default();
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(variable.name.clone(), value);
            }
        }
        Ok(())
    }

    /// Enter a lexeme: bump the depth, push a scope layer, evaluate, and
    /// unwind both on every path.
    pub(crate) fn evaluate_lexeme(
        &mut self,
        lexeme: &Lexeme,
        id: Option<LexemeId>,
    ) -> Result<Option<String>, ExpandError> {
        self.depth += 1;
        self.scopes.push(FxHashMap::default());

        let limit = self.grammar.settings().max_recursion_depth;
        let result = if self.depth > limit {
            Err(ExpandError::RecursionLimitExceeded {
                limit,
                text: lexeme.original_string().to_string(),
            })
        } else {
            self.evaluate_body(lexeme, id)
        };

        self.scopes.pop();
        self.depth -= 1;
        result
    }

    fn evaluate_body(&mut self, lexeme: &Lexeme, id: Option<LexemeId>) -> Result<Option<String>, ExpandError> {
        for variable in lexeme.variables() {
            let value = self
                .evaluate_lexeme(&variable.lexeme, None)?
                .unwrap_or_default();
            if let Some(scope) = self.scopes.last_mut() {
                scope.insert(variable.name.clone(), value);
            }
        }

        let mut values = Vec::with_capacity(lexeme.expansions().len());
        let mut live = false;
        for expansion in lexeme.expansions() {
            match self.evaluate_expansion(expansion)? {
                Some(resolved) => {
                    // Decorators never keep their lexeme alive
                    live |= resolved.live && !expansion.is_decorator;
                    values.push(resolved.value);
                }
                None => {
                    if let Some(id) = id {
                        self.mark_seen(id);
                    }
                    debug!("lexeme {:?} exhausted", lexeme.original_string());
                    return Ok(None);
                }
            }
        }

        if !live {
            if let Some(id) = id {
                self.mark_seen(id);
            }
        }
        Ok(Some(lexeme.format(&values)))
    }

    fn evaluate_expansion(&mut self, expansion: &Expansion) -> Result<Option<Resolved>, ExpandError> {
        let Some(resolved) = self.resolve_symbol(&expansion.name)? else {
            return Ok(None);
        };
        let mut value = resolved.value;
        for call in &expansion.modifiers {
            value = apply_modifier(call, &value, self)?;
        }
        Ok(Some(Resolved {
            value,
            live: resolved.live,
        }))
    }

    fn resolve_symbol(&mut self, name: &str) -> Result<Option<Resolved>, ExpandError> {
        if let Some(value) = self.lookup_variable(name) {
            return Ok(Some(Resolved::fixed(value.to_string())));
        }

        let grammar = self.grammar;
        if let Some(symbol) = grammar.markov_symbol(name) {
            let value = self.generate_markov(symbol)?;
            return Ok(Some(Resolved { value, live: true }));
        }
        if let Some(rule) = grammar.rule(name) {
            let value = self.expand_rule_entry(rule)?;
            let live = self.has_unseen(rule);
            return Ok(value.map(|value| Resolved { value, live }));
        }

        if name.is_empty() {
            Ok(Some(Resolved::fixed(String::new())))
        } else {
            Err(ExpandError::UnknownSymbol(name.to_string()))
        }
    }

    fn expand_rule_entry(&mut self, rule: &Rule) -> Result<Option<String>, ExpandError> {
        let tracking = self.is_tracking();
        let picked = if tracking {
            let seen = self.seen_lexemes();
            select::pick(rule, Some(&seen), &mut *self.random)
        } else {
            select::pick(rule, None, &mut *self.random)
        };

        let Some(id) = picked else {
            if tracking {
                debug!("rule '{}' has no unseen alternatives", rule.name());
                return Ok(None);
            }
            return Ok(Some(String::new()));
        };

        let grammar = self.grammar;
        let lexeme = grammar.lexeme(id)?;
        debug!(
            "rule '{}' picked {:?} at depth {}",
            rule.name(),
            lexeme.original_string(),
            self.depth
        );
        self.evaluate_lexeme(lexeme, Some(id))
    }

    /// Draw from a Markov symbol until an output passes the length and
    /// uniqueness filters, or give up with `""` after `max_tries`.
    fn generate_markov(&mut self, symbol: &MarkovSymbol) -> Result<String, ExpandError> {
        let settings = symbol.model.settings();
        for _ in 0..settings.max_tries {
            let Some(text) = symbol.model.generate(&mut *self.random)? else {
                continue;
            };
            if text.chars().count() < settings.min_characters {
                continue;
            }
            let accepted = self.markov_outputs.entry(symbol.name.clone()).or_default();
            if settings.unique_output && accepted.contains(&text) {
                continue;
            }
            accepted.insert(text.clone());
            return Ok(text);
        }

        warn!(
            "failed to generate markov text for '{}' after {} tries",
            symbol.name, settings.max_tries
        );
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grammar::ExpansionSettings;
    use crate::core::markov::MarkovSettings;
    use crate::core::random::{ScriptedRandom, SeededRandom};

    fn zero() -> ScriptedRandom {
        ScriptedRandom::fixed(0.0)
    }

    #[test]
    fn literal_text_passes_through() {
        let g = Grammar::new();
        assert_eq!(expand(&g, "just text", &mut zero()).unwrap(), "just text");
        assert_eq!(expand(&g, "", &mut zero()).unwrap(), "");
    }

    #[test]
    fn rule_expansion_recurses() {
        let mut g = Grammar::new();
        g.add_rule_texts("a", ["{b}"]).unwrap();
        g.add_rule_texts("b", ["{c}"]).unwrap();
        g.add_rule_texts("c", ["deep"]).unwrap();
        assert_eq!(expand(&g, "{a}!", &mut zero()).unwrap(), "deep!");
    }

    #[test]
    fn local_variables_see_earlier_siblings() {
        let g = Grammar::new();
        let out = expand(&g, "{x= one}{y= {x} two}{y}", &mut zero()).unwrap();
        assert_eq!(out, "one two");
    }

    #[test]
    fn local_variable_shadows_rule() {
        let mut g = Grammar::new();
        g.add_rule_texts("animal", ["cat"]).unwrap();
        assert_eq!(expand(&g, "{animal= dog}{animal}", &mut zero()).unwrap(), "dog");
        assert_eq!(expand(&g, "{animal}", &mut zero()).unwrap(), "cat");
    }

    #[test]
    fn child_lexemes_see_parent_locals_but_not_the_reverse() {
        let mut g = Grammar::new();
        g.add_rule_texts("child", ["{name}"]).unwrap();
        g.add_rule_texts("leaky", ["{hidden= secret}"]).unwrap();

        assert_eq!(expand(&g, "{name= Ann}{child}", &mut zero()).unwrap(), "Ann");

        let err = expand(&g, "{leaky}{hidden}", &mut zero()).unwrap_err();
        assert!(matches!(err, ExpandError::UnknownSymbol(ref n) if n == "hidden"));
    }

    #[test]
    fn scopes_and_depth_unwind_after_errors() {
        let mut g = Grammar::new();
        g.add_rule_texts("bad", ["{missing}"]).unwrap();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);

        assert!(ctx.expand("{bad}").is_err());
        assert_eq!(ctx.depth(), 0);
        assert!(ctx.scopes.is_empty());
        assert_eq!(ctx.expand("fine").unwrap(), "fine");
    }

    #[test]
    fn globals_are_evaluated_in_order() {
        let mut g = Grammar::new();
        g.add_variable("first", "A").unwrap();
        g.add_variable("second", "{first}B").unwrap();
        assert_eq!(expand(&g, "{second}", &mut zero()).unwrap(), "AB");
    }

    #[test]
    fn globals_are_fixed_for_one_expansion() {
        let mut g = Grammar::new();
        g.add_rule_texts("letter", ["a", "b"]).unwrap();
        g.add_variable("pick", "{letter}").unwrap();

        let mut random = ScriptedRandom::new([0.0, 0.999]);
        assert_eq!(expand(&g, "{pick} {pick} {letter}", &mut random).unwrap(), "a a b");
    }

    #[test]
    fn unknown_symbol_is_an_error() {
        let g = Grammar::new();
        let err = expand(&g, "{nope}", &mut zero()).unwrap_err();
        assert!(matches!(err, ExpandError::UnknownSymbol(ref n) if n == "nope"));
    }

    #[test]
    fn empty_name_resolves_to_empty_string() {
        let g = Grammar::new();
        assert_eq!(expand(&g, "[{.capitalize}]", &mut zero()).unwrap(), "[]");
    }

    #[test]
    fn syntax_errors_surface() {
        let g = Grammar::new();
        assert!(matches!(expand(&g, "{open", &mut zero()), Err(ExpandError::Syntax(_))));

        let mut g = Grammar::new();
        g.add_rule_texts("r", ["{bad"]).unwrap();
        assert!(matches!(expand(&g, "{r}", &mut zero()), Err(ExpandError::Syntax(_))));
    }

    #[test]
    fn self_reference_hits_recursion_limit() {
        let mut g = Grammar::new();
        g.add_rule_texts("loop", ["x{loop}"]).unwrap();
        match expand(&g, "{loop}", &mut zero()) {
            Err(ExpandError::RecursionLimitExceeded { limit, .. }) => assert_eq!(limit, 20),
            other => panic!("expected recursion error, got {:?}", other),
        }
    }

    #[test]
    fn recursion_limit_is_configurable() {
        let mut g = Grammar::new();
        g.add_rule_texts("r", ["{r}", "end"]).unwrap();
        g.set_expansion_settings(ExpansionSettings {
            max_recursion_depth: 3,
        });

        // Top-level lexeme is depth 1; two nested picks stay within 3
        let mut random = ScriptedRandom::new([0.0, 0.999]);
        assert_eq!(expand(&g, "{r}", &mut random).unwrap(), "end");

        let mut random = ScriptedRandom::new([0.0, 0.0, 0.999]);
        assert!(matches!(
            expand(&g, "{r}", &mut random),
            Err(ExpandError::RecursionLimitExceeded { limit: 3, .. })
        ));
    }

    #[test]
    fn zero_weight_rule_expands_to_empty() {
        let mut g = Grammar::new();
        g.add_rule("never", [("x", 0.0)]).unwrap();
        assert_eq!(expand(&g, "<{never}>", &mut zero()).unwrap(), "<>");
    }

    #[test]
    fn exhausted_rule_under_tracking_is_none() {
        let mut g = Grammar::new();
        g.add_rule_texts("one", ["only"]).unwrap();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);

        ctx.push_tracker();
        assert_eq!(ctx.expand_rule("one").unwrap().as_deref(), Some("only"));
        assert_eq!(ctx.expand_rule("one").unwrap(), None);
        ctx.pop_tracker();
        assert_eq!(ctx.expand_rule("one").unwrap().as_deref(), Some("only"));
    }

    #[test]
    fn parent_stays_live_while_child_has_unseen_alternatives() {
        let mut g = Grammar::new();
        g.add_rule_texts("animal", ["{size} cat"]).unwrap();
        g.add_rule_texts("size", ["big", "small"]).unwrap();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);

        ctx.push_tracker();
        assert_eq!(ctx.expand_rule("animal").unwrap().as_deref(), Some("big cat"));
        assert_eq!(ctx.expand_rule("animal").unwrap().as_deref(), Some("small cat"));
        assert_eq!(ctx.expand_rule("animal").unwrap(), None);
    }

    #[test]
    fn decorators_do_not_keep_parent_live() {
        let mut g = Grammar::new();
        g.add_rule_texts("animal", ["{{size}} cat"]).unwrap();
        g.add_rule_texts("size", ["big", "small"]).unwrap();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);

        ctx.push_tracker();
        assert_eq!(ctx.expand_rule("animal").unwrap().as_deref(), Some("big cat"));
        assert_eq!(ctx.expand_rule("animal").unwrap(), None);
    }

    #[test]
    fn expand_rule_rejects_unknown_names() {
        let g = Grammar::new();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);
        assert!(matches!(ctx.expand_rule("ghost"), Err(ExpandError::UnknownSymbol(_))));
    }

    #[test]
    fn expand_rule_on_a_fresh_context_sees_globals() {
        let mut g = Grammar::new();
        g.add_variable("hero", "Ann").unwrap();
        g.add_rule_texts("greet", ["hi {hero}"]).unwrap();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);
        assert_eq!(ctx.expand_rule("greet").unwrap().as_deref(), Some("hi Ann"));
        assert!(ctx.scopes.is_empty());
        assert!(!ctx.globals_loaded);
    }

    #[test]
    fn locals_shadow_globals_in_reentrant_expansion() {
        let mut g = Grammar::new();
        g.add_variable("who", "Bo").unwrap();
        g.register_modifier_fn("echo", |_, _, ctx| ctx.expand("{who}"));
        g.add_rule_texts("scene", ["{who= Ann}{.echo}"]).unwrap();
        let mut random = zero();
        let mut ctx = ExpansionContext::new(&g, &mut random);
        assert_eq!(ctx.expand_rule("scene").unwrap().as_deref(), Some("Ann"));
    }

    #[test]
    fn broken_markov_model_surfaces_as_an_error() {
        let model: crate::core::markov::MarkovModel =
            ron::from_str(r#"(settings: (order: 1), transitions: {"": ["storm"]}, sentence_count: 1)"#)
                .unwrap();
        let mut g = Grammar::new();
        g.insert_markov_model("weather", model);
        assert!(matches!(
            expand(&g, "{weather}", &mut zero()),
            Err(ExpandError::Markov(MarkovError::UnknownContext(_)))
        ));
    }

    #[test]
    fn markov_symbol_resolves() {
        let mut g = Grammar::new();
        let settings = MarkovSettings {
            order: 1,
            ..MarkovSettings::default()
        };
        g.add_markov_symbol("m", ["a b c"], settings).unwrap();
        assert_eq!(expand(&g, "{m}", &mut zero()).unwrap(), "a b c");
    }

    #[test]
    fn markov_unique_output_gives_up_softly() {
        let mut g = Grammar::new();
        let settings = MarkovSettings {
            order: 1,
            max_tries: 5,
            ..MarkovSettings::default()
        };
        g.add_markov_symbol("m", ["a b c"], settings).unwrap();
        // The model can only ever produce one sentence
        assert_eq!(expand(&g, "{m}|{m}", &mut zero()).unwrap(), "a b c|");
    }

    #[test]
    fn markov_min_characters_filters_short_output() {
        let mut g = Grammar::new();
        let settings = MarkovSettings {
            order: 1,
            min_characters: 10,
            max_tries: 3,
            ..MarkovSettings::default()
        };
        g.add_markov_symbol("m", ["a b c"], settings).unwrap();
        assert_eq!(expand(&g, "{m}", &mut zero()).unwrap(), "");
    }

    #[test]
    fn markov_outputs_are_unique_within_one_expansion() {
        let mut g = Grammar::new();
        let settings = MarkovSettings {
            order: 1,
            ..MarkovSettings::default()
        };
        g.add_markov_symbol("m", ["red fox", "blue fox", "red owl", "blue owl"], settings)
            .unwrap();
        let mut random = SeededRandom::from_seed(3);
        let out = expand(&g, "{m}|{m}|{m}", &mut random).unwrap();
        let parts: Vec<&str> = out.split('|').collect();
        assert_eq!(parts.len(), 3);
        for (i, a) in parts.iter().enumerate() {
            for b in &parts[i + 1..] {
                assert!(a.is_empty() || a != b, "duplicate markov output in {:?}", out);
            }
        }
    }

    #[test]
    fn nested_expand_reuses_scope() {
        let mut g = Grammar::new();
        g.register_modifier_fn("echo", |_, args, ctx| {
            let template = args.first().and_then(|a| a.as_str()).unwrap_or_default();
            ctx.expand(template)
        });
        let out = expand(&g, "{who= Ann}{.echo('hi {who}')}", &mut zero()).unwrap();
        assert_eq!(out, "hi Ann");
    }
}
