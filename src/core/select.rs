//! Weighted choice among a rule's alternatives.

use rustc_hash::FxHashSet;

use crate::core::grammar::{LexemeId, Rule, WeightedLexeme};
use crate::core::random::RandomSource;

/// Pick one alternative of `rule`, skipping any whose id is in `excluded`.
///
/// Returns `None` when the eligible alternatives carry no weight. Ties follow
/// declaration order; a draw of 0 yields the first weighted alternative and a
/// draw just below 1 yields the last.
pub fn pick(
    rule: &Rule,
    excluded: Option<&FxHashSet<LexemeId>>,
    random: &mut dyn RandomSource,
) -> Option<LexemeId> {
    let eligible = |wl: &&WeightedLexeme| {
        wl.weight > 0.0 && excluded.map_or(true, |ex| !ex.contains(&wl.id))
    };

    let total_weight: f64 = match excluded {
        None => rule.total_weight(),
        Some(_) => rule.weighted_lexemes().iter().filter(eligible).map(|wl| wl.weight).sum(),
    };
    if total_weight <= 0.0 {
        return None;
    }

    let target = random.next_f64() * total_weight;
    let mut cumulative = 0.0;
    let mut last = None;
    for wl in rule.weighted_lexemes().iter().filter(eligible) {
        cumulative += wl.weight;
        if target < cumulative {
            return Some(wl.id);
        }
        last = Some(wl.id);
    }
    // Rounding can leave the target at or past the final boundary
    last
}
