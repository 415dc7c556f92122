//! Modifier dispatch and the built-in modifier set.
//!
//! A modifier turns the resolved value of an expansion into a new string.
//! Lookup tries the grammar's overrides first, then the built-ins; a name
//! found in neither is an [`ExpandError::UnrecognizedModifier`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::context::ExpansionContext;
use crate::core::expand::ExpandError;
use crate::core::grammar::Grammar;
use crate::core::inflect;
use crate::core::lexeme::{ArgValue, ModifierCall};

/// Upper bound on attempts `uniques` makes before returning what it has.
const MAX_UNIQUE_TRIES: usize = 9999;

/// Largest output, in bytes, `times` will build.
const MAX_TIMES_OUTPUT: usize = 1 << 20;

/// Most dice a single `roll` may throw.
const MAX_DICE: u32 = 10_000;

const RANDOM_NUMBER_DEFAULT_MIN: i64 = 0;
const RANDOM_NUMBER_DEFAULT_MAX: i64 = 99;

/// Dice notation: count, sides, and an optional signed bonus.
static DICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s*[dD]\s*(\d+)\s*(?:([+-])\s*(\d+))?\s*$").expect("dice pattern is valid")
});

/// A transformation applied to an expansion's value.
///
/// `ctx` gives access to the grammar, the random source, and re-entrant
/// expansion that shares the caller's scope and uniqueness trackers.
pub trait Modifier: Send + Sync {
    fn apply(&self, value: &str, args: &[ArgValue], ctx: &mut ExpansionContext<'_>) -> Result<String, ExpandError>;
}

/// Adapter that lets a closure act as a [`Modifier`].
pub struct FnModifier<F>(F);

impl<F> FnModifier<F>
where
    F: Fn(&str, &[ArgValue], &mut ExpansionContext<'_>) -> Result<String, ExpandError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Modifier for FnModifier<F>
where
    F: Fn(&str, &[ArgValue], &mut ExpansionContext<'_>) -> Result<String, ExpandError> + Send + Sync,
{
    fn apply(&self, value: &str, args: &[ArgValue], ctx: &mut ExpansionContext<'_>) -> Result<String, ExpandError> {
        (self.0)(value, args, ctx)
    }
}

/// The fixed set of modifiers every grammar understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinModifier {
    Capitalize,
    CapitalizeAll,
    Quotes,
    Times,
    Article,
    Plural,
    Singular,
    Possessive,
    RandomNumber,
    Roll,
    Uniques,
}

static BUILTINS: [BuiltinModifier; 11] = [
    BuiltinModifier::Capitalize,
    BuiltinModifier::CapitalizeAll,
    BuiltinModifier::Quotes,
    BuiltinModifier::Times,
    BuiltinModifier::Article,
    BuiltinModifier::Plural,
    BuiltinModifier::Singular,
    BuiltinModifier::Possessive,
    BuiltinModifier::RandomNumber,
    BuiltinModifier::Roll,
    BuiltinModifier::Uniques,
];

impl BuiltinModifier {
    pub fn all() -> &'static [BuiltinModifier] {
        &BUILTINS
    }

    /// The name templates use to call this modifier.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinModifier::Capitalize => "capitalize",
            BuiltinModifier::CapitalizeAll => "capitalizeall",
            BuiltinModifier::Quotes => "quotes",
            BuiltinModifier::Times => "times",
            BuiltinModifier::Article => "a",
            BuiltinModifier::Plural => "s",
            BuiltinModifier::Singular => "singular",
            BuiltinModifier::Possessive => "possessive",
            BuiltinModifier::RandomNumber => "randomNumber",
            BuiltinModifier::Roll => "roll",
            BuiltinModifier::Uniques => "uniques",
        }
    }

    pub fn from_name(name: &str) -> Option<BuiltinModifier> {
        BUILTINS.iter().copied().find(|b| b.name() == name)
    }
}

impl Modifier for BuiltinModifier {
    fn apply(&self, value: &str, args: &[ArgValue], ctx: &mut ExpansionContext<'_>) -> Result<String, ExpandError> {
        let name = self.name();
        match self {
            BuiltinModifier::Capitalize => Ok(inflect::capitalize(value)),
            BuiltinModifier::CapitalizeAll => Ok(inflect::capitalize_all(value)),
            BuiltinModifier::Quotes => Ok(format!("\"{}\"", value)),
            BuiltinModifier::Times => {
                let count = count_arg(name, args, 0)?
                    .ok_or_else(|| argument_error(name, "expected a repetition count"))?;
                repeat(value, count)
            }
            BuiltinModifier::Article => Ok(inflect::with_article(value)),
            BuiltinModifier::Plural => Ok(inflect::pluralize(value)),
            BuiltinModifier::Singular => Ok(inflect::singularize(value)),
            BuiltinModifier::Possessive => Ok(inflect::possessive(value)),
            BuiltinModifier::RandomNumber => {
                let min = integer_arg(name, args, 0)?.unwrap_or(RANDOM_NUMBER_DEFAULT_MIN);
                let max = integer_arg(name, args, 1)?.unwrap_or(RANDOM_NUMBER_DEFAULT_MAX);
                Ok(ctx.random().range_inclusive(min, max).to_string())
            }
            BuiltinModifier::Roll => {
                let notation = string_arg(name, args, 0)?
                    .ok_or_else(|| argument_error(name, "expected dice notation such as \"2d6+1\""))?;
                roll(notation, ctx).map(|total| total.to_string())
            }
            BuiltinModifier::Uniques => uniques(args, ctx),
        }
    }
}

/// Find the modifier `name` resolves to for `grammar`: an override if one is
/// registered, otherwise a built-in.
pub fn lookup<'g>(grammar: &'g Grammar, name: &str) -> Option<&'g dyn Modifier> {
    grammar.modifier(name).or_else(|| {
        BUILTINS
            .iter()
            .find(|b| b.name() == name)
            .map(|b| b as &dyn Modifier)
    })
}

/// Apply one modifier call to `value`.
pub fn apply_modifier(call: &ModifierCall, value: &str, ctx: &mut ExpansionContext<'_>) -> Result<String, ExpandError> {
    let grammar = ctx.grammar();
    match lookup(grammar, &call.name) {
        Some(modifier) => modifier.apply(value, &call.args, ctx),
        None => Err(ExpandError::UnrecognizedModifier(call.name.clone())),
    }
}

fn argument_error(modifier: &str, reason: impl Into<String>) -> ExpandError {
    ExpandError::ModifierArguments {
        modifier: modifier.to_string(),
        reason: reason.into(),
    }
}

fn string_arg<'v>(modifier: &str, args: &'v [ArgValue], index: usize) -> Result<Option<&'v str>, ExpandError> {
    match args.get(index) {
        None => Ok(None),
        Some(ArgValue::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(argument_error(
            modifier,
            format!("argument {} must be a string, got {}", index + 1, other),
        )),
    }
}

/// An integer argument. Numeric strings are accepted; fractions truncate.
fn integer_arg(modifier: &str, args: &[ArgValue], index: usize) -> Result<Option<i64>, ExpandError> {
    let number = match args.get(index) {
        None => return Ok(None),
        Some(ArgValue::Number(n)) => *n,
        Some(ArgValue::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            argument_error(modifier, format!("argument {} must be a number, got {:?}", index + 1, s))
        })?,
    };
    if !number.is_finite() {
        return Err(argument_error(
            modifier,
            format!("argument {} must be finite", index + 1),
        ));
    }
    Ok(Some(number.trunc() as i64))
}

fn count_arg(modifier: &str, args: &[ArgValue], index: usize) -> Result<Option<usize>, ExpandError> {
    match args.get(index) {
        None => Ok(None),
        Some(ArgValue::Number(n)) if n.is_finite() && *n >= 0.0 => Ok(Some(n.trunc() as usize)),
        Some(other) => Err(argument_error(
            modifier,
            format!("argument {} must be a non-negative number, got {}", index + 1, other),
        )),
    }
}

/// `value` repeated `count` times, space separated.
fn repeat(value: &str, count: usize) -> Result<String, ExpandError> {
    let size = (value.len() + 1)
        .checked_mul(count)
        .filter(|size| *size <= MAX_TIMES_OUTPUT + 1)
        .ok_or_else(|| {
            argument_error(
                "times",
                format!("{} repetitions would exceed {} bytes", count, MAX_TIMES_OUTPUT),
            )
        })?;
    let mut output = String::with_capacity(size);
    for (i, part) in std::iter::repeat(value).take(count).enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(part);
    }
    Ok(output)
}

fn roll(notation: &str, ctx: &mut ExpansionContext<'_>) -> Result<i64, ExpandError> {
    let invalid = || argument_error("roll", format!("invalid dice notation {:?}", notation));
    let caps = DICE.captures(notation).ok_or_else(invalid)?;

    let count: u32 = caps[1].parse().map_err(|_| invalid())?;
    let sides: i64 = caps[2].parse().map_err(|_| invalid())?;
    if sides < 1 || count > MAX_DICE {
        return Err(invalid());
    }
    let bonus: i64 = match (caps.get(3), caps.get(4)) {
        (Some(sign), Some(amount)) => {
            let amount: i64 = amount.as_str().parse().map_err(|_| invalid())?;
            if sign.as_str() == "-" {
                -amount
            } else {
                amount
            }
        }
        _ => 0,
    };

    let random = ctx.random();
    let mut total = bonus;
    for _ in 0..count {
        total = total.saturating_add(random.range_inclusive(1, sides));
    }
    Ok(total)
}

/// `uniques(rule, count, separator = " ")`: up to `count` distinct
/// expansions of `rule`, stopping early once the rule has nothing new left.
fn uniques(args: &[ArgValue], ctx: &mut ExpansionContext<'_>) -> Result<String, ExpandError> {
    const NAME: &str = "uniques";
    let rule_name = string_arg(NAME, args, 0)?.ok_or_else(|| argument_error(NAME, "expected a rule name"))?;
    let count = count_arg(NAME, args, 1)?.ok_or_else(|| argument_error(NAME, "expected a count"))?;
    let separator = string_arg(NAME, args, 2)?.unwrap_or(" ");

    let grammar = ctx.grammar();
    let rule = grammar.rule(rule_name).ok_or_else(|| ExpandError::UnknownRule {
        modifier: NAME.to_string(),
        rule: rule_name.to_string(),
    })?;

    ctx.with_uniqueness(|ctx| {
        let mut picks: Vec<String> = Vec::with_capacity(count.min(64));
        let mut tries = 0;
        while picks.len() < count && tries < MAX_UNIQUE_TRIES {
            tries += 1;
            match ctx.expand_rule(rule_name)? {
                Some(text) => {
                    if !picks.contains(&text) {
                        picks.push(text);
                    }
                }
                // An exhausted branch was marked seen; retry while others remain
                None if ctx.has_unseen(rule) => continue,
                None => break,
            }
        }
        if picks.len() < count {
            log::debug!(
                "uniques: '{}' produced {} of {} requested values",
                rule_name,
                picks.len(),
                count
            );
        }
        Ok(picks.join(separator))
    })
}
