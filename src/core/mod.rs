pub mod context;
pub mod expand;
pub mod grammar;
pub mod inflect;
pub mod lexeme;
pub mod lint;
pub mod literal;
pub mod markov;
pub mod modifiers;
pub mod pipeline;
pub mod random;
pub mod select;

pub use context::ExpansionContext;
pub use expand::{expand, ExpandError};
pub use grammar::{
    ExpansionSettings, Grammar, GrammarError, LexemeId, MarkovSymbol, Rule, WeightedLexeme,
    DEFAULT_MAX_RECURSION_DEPTH,
};
pub use lexeme::{ArgValue, Expansion, Lexeme, ModifierCall, SyntaxError, SyntaxErrorKind, Variable};
pub use lint::{lint, LintReport};
pub use markov::{MarkovError, MarkovModel, MarkovSettings};
pub use modifiers::{BuiltinModifier, FnModifier, Modifier};
pub use pipeline::{Generator, GeneratorBuilder, GeneratorError};
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
