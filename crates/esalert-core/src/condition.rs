//! Rule conditions: which flattened values must satisfy which operators.
//!
//! A condition arrives as a loose JSON object (`{"field": "...", "gt": 10}`)
//! and is validated once, at load time, into a typed [`Condition`].

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::str::FromStr;

use crate::error::{AlertError, Result};

const KEY_FIELD: &str = "field";
const KEY_QUANTIFIER: &str = "quantifier";

/// How many matched values must satisfy a condition for it to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantifier {
    /// At least one match satisfies (false with zero matches).
    #[default]
    Any,
    /// Every match satisfies (true with zero matches).
    All,
    /// No match satisfies (true with zero matches).
    None,
}

impl FromStr for Quantifier {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "any" => Ok(Quantifier::Any),
            "all" => Ok(Quantifier::All),
            "none" => Ok(Quantifier::None),
            _ => Err(AlertError::Condition(
                "field 'quantifier' of condition must either be 'any', 'all', or 'none'".into(),
            )),
        }
    }
}

/// Operand of `eq` / `ne`.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Str(String),
    Number(BigDecimal),
    Bool(bool),
}

/// A validated condition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Condition {
    /// Dotted path into the search response.
    pub field: String,
    pub quantifier: Quantifier,
    pub eq: Option<Operand>,
    pub ne: Option<Operand>,
    pub lt: Option<BigDecimal>,
    pub le: Option<BigDecimal>,
    pub gt: Option<BigDecimal>,
    pub ge: Option<BigDecimal>,
}

impl Condition {
    /// A condition on `field` with no operators, quantified by `any`.
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
            quantifier: Quantifier::Any,
            eq: None,
            ne: None,
            lt: None,
            le: None,
            gt: None,
            ge: None,
        }
    }

    pub fn with_quantifier(mut self, quantifier: Quantifier) -> Self {
        self.quantifier = quantifier;
        self
    }
}

impl TryFrom<Map<String, Value>> for Condition {
    type Error = AlertError;

    fn try_from(mut raw: Map<String, Value>) -> Result<Self> {
        let mut errors: Vec<String> = Vec::new();

        let field = match raw.remove(KEY_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(_) => {
                errors.push("field 'field' of condition must not be empty".into());
                String::new()
            }
            None => {
                errors.push("condition must have the field 'field'".into());
                String::new()
            }
        };

        let quantifier = match raw.remove(KEY_QUANTIFIER) {
            None => Quantifier::Any,
            Some(Value::String(s)) => match s.parse() {
                Ok(q) => q,
                Err(_) => {
                    errors.push(
                        "field 'quantifier' of condition must either be 'any', 'all', or 'none'".into(),
                    );
                    Quantifier::Any
                }
            },
            Some(_) => {
                errors.push("field 'quantifier' of condition must be a string".into());
                Quantifier::Any
            }
        };

        let eq = take_operand(&mut raw, "eq", &mut errors);
        let ne = take_operand(&mut raw, "ne", &mut errors);
        let lt = take_numeric(&mut raw, "lt", &mut errors);
        let le = take_numeric(&mut raw, "le", &mut errors);
        let gt = take_numeric(&mut raw, "gt", &mut errors);
        let ge = take_numeric(&mut raw, "ge", &mut errors);

        for key in raw.keys() {
            tracing::warn!("⚠️ Ignoring unknown operator '{}' in condition on '{}'", key, field);
        }

        if !errors.is_empty() {
            return Err(AlertError::Condition(errors.join("; ")));
        }

        Ok(Self {
            field,
            quantifier,
            eq,
            ne,
            lt,
            le,
            gt,
            ge,
        })
    }
}

/// Exact decimal form of a JSON number.
///
/// Numbers keep their source text, so this never passes through `f64`.
pub fn decimal_from_number(n: &Number) -> Option<BigDecimal> {
    BigDecimal::from_str(n.as_str()).ok()
}

fn take_operand(raw: &mut Map<String, Value>, op: &str, errors: &mut Vec<String>) -> Option<Operand> {
    match raw.remove(op)? {
        Value::String(s) if s.is_empty() => {
            errors.push(format!("value of operator '{op}' should not be empty"));
            None
        }
        Value::String(s) => Some(Operand::Str(s)),
        Value::Bool(b) => Some(Operand::Bool(b)),
        Value::Number(n) => match decimal_from_number(&n) {
            Some(d) => Some(Operand::Number(d)),
            None => {
                errors.push(format!("value of operator '{op}' is not a valid number"));
                None
            }
        },
        _ => {
            errors.push(format!(
                "value of operator '{op}' should either be a number, a string, or a boolean"
            ));
            None
        }
    }
}

fn take_numeric(raw: &mut Map<String, Value>, op: &str, errors: &mut Vec<String>) -> Option<BigDecimal> {
    match raw.remove(op)? {
        Value::Number(n) => {
            let parsed = decimal_from_number(&n);
            if parsed.is_none() {
                errors.push(format!("value of operator '{op}' is not a valid number"));
            }
            parsed
        }
        Value::Null => {
            errors.push(format!("value of operator '{op}' should not be empty"));
            None
        }
        _ => {
            errors.push(format!("value of operator '{op}' should be a number"));
            None
        }
    }
}
