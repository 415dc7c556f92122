//! Brogue: grammar-driven procedural text generation.
//!
//! Templates such as `"{hero.capitalize} found {treasure.a}."` are expanded
//! against a [`Grammar`] of weighted rules, global variables, and
//! Markov-chain symbols. Expansions can declare scoped variables, pipe values
//! through modifiers, and draw unique picks from a rule.
//!
//! ```
//! use brogue::{Grammar, ScriptedRandom};
//!
//! let mut grammar = Grammar::new();
//! grammar.add_rule_texts("animal", ["cat", "owl"]).unwrap();
//!
//! let mut random = ScriptedRandom::fixed(0.0);
//! let text = grammar.expand("{animal.a.capitalize} and two {animal.s}", &mut random).unwrap();
//! assert_eq!(text, "A cat and two cats");
//! ```

pub mod core;

pub use crate::core::{
    expand, lint, ArgValue, BuiltinModifier, ExpandError, ExpansionContext, ExpansionSettings,
    FnModifier, Generator, GeneratorBuilder, GeneratorError, Grammar, GrammarError, Lexeme,
    LexemeId, LintReport, MarkovError, MarkovModel, MarkovSettings, Modifier, RandomSource, Rule,
    ScriptedRandom, SeededRandom, SyntaxError, SyntaxErrorKind,
};
