//! Static checks over a grammar's tables.

use std::collections::HashSet;

use crate::core::grammar::{Grammar, Rule};
use crate::core::lexeme::{Lexeme, Variable};
use crate::core::modifiers::{self, BuiltinModifier};

/// Findings of [`lint`]. Errors describe templates that are certain to fail
/// at expansion time; warnings describe ones that might.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LintReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LintReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }
}

/// Check every rule alternative and global variable of `grammar`.
///
/// Parsing happens as a side effect, so a grammar that lints without errors
/// has every alternative parsed and cached.
pub fn lint(grammar: &Grammar) -> LintReport {
    let mut report = LintReport::default();
    let globals: HashSet<&str> = grammar.variables().iter().map(|v| v.name.as_str()).collect();

    let mut rules: Vec<&Rule> = grammar.rules().collect();
    rules.sort_by(|a, b| a.name().cmp(b.name()));

    for rule in &rules {
        let name = rule.name();
        if rule.is_empty() {
            report.warnings.push(format!("Rule '{}' has no alternatives", name));
        } else if rule.total_weight() <= 0.0 {
            report
                .warnings
                .push(format!("Rule '{}' has zero total weight and always expands to \"\"", name));
        }

        let mut parsed: Vec<&Lexeme> = Vec::with_capacity(rule.len());
        for wl in rule.weighted_lexemes() {
            match grammar.lexeme(wl.id) {
                Ok(lexeme) => parsed.push(lexeme),
                Err(e) => report
                    .errors
                    .push(format!("Rule '{}' has an unparsable alternative: {}", name, e)),
            }
        }

        for lexeme in &parsed {
            check_lexeme(grammar, &globals, &format!("Rule '{}'", name), lexeme, &mut report);
        }

        let all_self_referencing = !parsed.is_empty()
            && parsed.len() == rule.len()
            && parsed.iter().all(|lexeme| references(lexeme, name));
        if all_self_referencing {
            report.errors.push(format!(
                "Rule '{}' has no non-recursive alternative (infinite recursion)",
                name
            ));
        }
    }

    for Variable { name, lexeme } in grammar.variables() {
        check_lexeme(grammar, &globals, &format!("Variable '{}'", name), lexeme, &mut report);
    }

    report
}

/// Whether `lexeme` or one of its nested locals expands `name`.
fn references(lexeme: &Lexeme, name: &str) -> bool {
    let mut found = false;
    lexeme.walk(&mut |l| found |= l.expansions().iter().any(|e| e.name == name));
    found
}

fn check_lexeme(
    grammar: &Grammar,
    globals: &HashSet<&str>,
    owner: &str,
    lexeme: &Lexeme,
    report: &mut LintReport,
) {
    let mut locals: HashSet<&str> = HashSet::new();
    lexeme.walk(&mut |l| locals.extend(l.variables().iter().map(|v| v.name.as_str())));

    lexeme.walk(&mut |l| {
        for expansion in l.expansions() {
            let name = expansion.name.as_str();
            let known = name.is_empty()
                || locals.contains(name)
                || globals.contains(name)
                || grammar.rule(name).is_some()
                || grammar.markov_symbol(name).is_some();
            if !known {
                report.warnings.push(format!(
                    "{} references '{}', which is not a rule, markov symbol, or variable in scope",
                    owner, name
                ));
            }

            for call in &expansion.modifiers {
                if modifiers::lookup(grammar, &call.name).is_none() {
                    report
                        .errors
                        .push(format!("{} uses unknown modifier '{}'", owner, call.name));
                    continue;
                }
                let is_builtin_uniques = grammar.modifier(&call.name).is_none()
                    && BuiltinModifier::from_name(&call.name) == Some(BuiltinModifier::Uniques);
                if is_builtin_uniques {
                    if let Some(target) = call.args.first().and_then(|a| a.as_str()) {
                        if grammar.rule(target).is_none() {
                            report.errors.push(format!(
                                "{} passes unknown rule '{}' to 'uniques'",
                                owner, target
                            ));
                        }
                    }
                }
            }
        }
    });
}
