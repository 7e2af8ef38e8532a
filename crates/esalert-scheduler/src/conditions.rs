//! Condition evaluation against a search response.
//!
//! Every condition flattens its `field` path and checks each match; the
//! quantifier decides how many matches must pass. Conditions are ANDed.

use bigdecimal::BigDecimal;
use esalert_core::condition::decimal_from_number;
use esalert_core::{Condition, Operand, Quantifier};
use serde_json::Value;

use crate::traverse::flatten;

/// Whether `response` satisfies every condition.
pub fn conditions_met(response: &Value, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| condition_met(response, condition))
}

/// Evaluate one condition under its quantifier.
pub fn condition_met(response: &Value, condition: &Condition) -> bool {
    let matches = flatten(response, &condition.field);
    let mut results = matches.iter().map(|m| satisfied(m, condition));
    match condition.quantifier {
        Quantifier::All => results.all(|sat| sat),
        Quantifier::Any => results.any(|sat| sat),
        Quantifier::None => !results.any(|sat| sat),
    }
}

/// Whether a single matched value passes every operator of `condition`.
fn satisfied(value: &Value, condition: &Condition) -> bool {
    match value {
        Value::String(s) => string_satisfied(s, condition),
        Value::Bool(b) => bool_satisfied(*b, condition),
        Value::Number(n) => match decimal_from_number(n) {
            Some(d) => number_satisfied(&d, condition),
            None => {
                tracing::warn!("⚠️ Unparseable number {} at '{}', treating as unmatched", n, condition.field);
                false
            }
        },
        // Nulls, objects and lists can't be compared; they pass so the rest of
        // the condition still decides.
        other => {
            tracing::warn!(
                field = %condition.field,
                value = %other,
                "value in Elasticsearch response is not a string, number, or boolean; ignoring condition for this value"
            );
            true
        }
    }
}

fn string_satisfied(s: &str, condition: &Condition) -> bool {
    let mut sat = true;
    if let Some(Operand::Str(v)) = &condition.eq {
        sat &= s == v;
    }
    if let Some(Operand::Str(v)) = &condition.ne {
        sat &= s != v;
    }
    sat
}

fn bool_satisfied(b: bool, condition: &Condition) -> bool {
    let mut sat = true;
    if let Some(Operand::Bool(v)) = &condition.eq {
        sat &= b == *v;
    }
    if let Some(Operand::Bool(v)) = &condition.ne {
        sat &= b != *v;
    }
    sat
}

fn number_satisfied(d: &BigDecimal, condition: &Condition) -> bool {
    let mut sat = true;
    if let Some(Operand::Number(v)) = &condition.eq {
        sat &= d == v;
    }
    if let Some(Operand::Number(v)) = &condition.ne {
        sat &= d != v;
    }
    if let Some(v) = &condition.lt {
        sat &= d < v;
    }
    if let Some(v) = &condition.le {
        sat &= d <= v;
    }
    if let Some(v) = &condition.gt {
        sat &= d > v;
    }
    if let Some(v) = &condition.ge {
        sat &= d >= v;
    }
    sat
}
