//! Condition evaluator — decides run/skip from `_flow_run_condition`.
//!
//! Evaluated strictly after input mapping and before dispatch. The value
//! arrives already resolved: a JSON boolean passes through, a string is
//! parsed as `lhs <op> rhs` with typed operand literals, and anything the
//! evaluator cannot make sense of is a node-scoped error rather than a
//! silent `false`.

use serde_json::Value;
use thiserror::Error;

/// Config key that gates node execution.
pub const RUN_CONDITION_KEY: &str = "_flow_run_condition";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("condition is empty")]
    Empty,

    #[error("condition must be a boolean or a string, got {0}")]
    NotScalar(&'static str),
}

/// Comparison operators, longest first so `==` never shadows `===`.
const OPERATORS: &[&str] = &["===", "!==", "==", "!=", "<=", ">=", "<", ">"];

/// Evaluate a resolved `_flow_run_condition` value to a boolean.
///
/// # Errors
/// Empty strings and non-scalar values are [`ConditionError`]s: the node
/// ends in terminal `error`, not a silent skip.
pub fn evaluate_condition(value: &Value) -> Result<bool, ConditionError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => evaluate_string(s),
        Value::Array(_) => Err(ConditionError::NotScalar("array")),
        Value::Object(_) => Err(ConditionError::NotScalar("object")),
    }
}

fn evaluate_string(condition: &str) -> Result<bool, ConditionError> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Err(ConditionError::Empty);
    }

    for op in OPERATORS {
        if let Some(split) = condition.find(op) {
            let lhs = parse_operand(&condition[..split]);
            let rhs = parse_operand(&condition[split + op.len()..]);
            return Ok(compare(&lhs, op, &rhs));
        }
    }

    // No operator: the whole string is a single operand; use its truthiness.
    Ok(parse_operand(condition).truthy())
}

/// A typed operand literal within a condition string.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Bool(bool),
    Null,
    Number(f64),
    Text(String),
}

impl Operand {
    fn truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Null => false,
            Self::Number(n) => *n != 0.0,
            Self::Text(s) => !s.is_empty(),
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    fn display(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Null => String::new(),
            Self::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    (*n as i64).to_string()
                } else {
                    n.to_string()
                }
            }
            Self::Text(s) => s.clone(),
        }
    }
}

fn parse_operand(raw: &str) -> Operand {
    let raw = raw.trim();
    match raw.to_ascii_lowercase().as_str() {
        "true" => return Operand::Bool(true),
        "false" => return Operand::Bool(false),
        "null" | "undefined" => return Operand::Null,
        _ => {}
    }
    if raw.len() >= 2 {
        let quoted = (raw.starts_with('\'') && raw.ends_with('\''))
            || (raw.starts_with('"') && raw.ends_with('"'));
        if quoted {
            return Operand::Text(raw[1..raw.len() - 1].to_string());
        }
    }
    if let Ok(n) = raw.parse::<f64>() {
        return Operand::Number(n);
    }
    Operand::Text(raw.to_string())
}

fn compare(lhs: &Operand, op: &str, rhs: &Operand) -> bool {
    match op {
        // Strict: types must match.
        "===" => lhs == rhs,
        "!==" => lhs != rhs,
        // Loose: numeric when both sides parse as numbers, else textual.
        "==" => loose_eq(lhs, rhs),
        "!=" => !loose_eq(lhs, rhs),
        "<" | ">" | "<=" | ">=" => {
            let ordering = match (lhs.as_number(), rhs.as_number()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => lhs.display().partial_cmp(&rhs.display()),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                "<" => ordering.is_lt(),
                ">" => ordering.is_gt(),
                "<=" => ordering.is_le(),
                ">=" => ordering.is_ge(),
                _ => unreachable!(),
            }
        }
        _ => unreachable!("operator list is fixed"),
    }
}

fn loose_eq(lhs: &Operand, rhs: &Operand) -> bool {
    if lhs == rhs {
        return true;
    }
    match (lhs.as_number(), rhs.as_number()) {
        (Some(a), Some(b)) => a == b,
        _ => lhs.display() == rhs.display(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn booleans_pass_through() {
        assert!(evaluate_condition(&json!(true)).unwrap());
        assert!(!evaluate_condition(&json!(false)).unwrap());
        assert!(!evaluate_condition(&json!(null)).unwrap());
    }

    #[test]
    fn numbers_use_truthiness() {
        assert!(evaluate_condition(&json!(1)).unwrap());
        assert!(!evaluate_condition(&json!(0)).unwrap());
    }

    #[test]
    fn strict_equality_compares_types() {
        assert!(evaluate_condition(&json!("42 === 42")).unwrap());
        assert!(!evaluate_condition(&json!("'42' === 42")).unwrap());
        assert!(evaluate_condition(&json!("'42' !== 42")).unwrap());
    }

    #[test]
    fn loose_equality_coerces_numbers() {
        assert!(evaluate_condition(&json!("'42' == 42")).unwrap());
        assert!(evaluate_condition(&json!("active == active")).unwrap());
        assert!(evaluate_condition(&json!("'a' != 'b'")).unwrap());
    }

    #[test]
    fn numeric_ordering() {
        assert!(evaluate_condition(&json!("3 < 10")).unwrap());
        assert!(evaluate_condition(&json!("10 >= 10")).unwrap());
        assert!(!evaluate_condition(&json!("10 < 3")).unwrap());
    }

    #[test]
    fn string_ordering_falls_back_to_lexicographic() {
        assert!(evaluate_condition(&json!("'apple' < 'banana'")).unwrap());
    }

    #[test]
    fn quoted_strings_keep_spaces_significant() {
        assert!(evaluate_condition(&json!("'on' == 'on'")).unwrap());
        assert!(!evaluate_condition(&json!("'on' == 'off'")).unwrap());
    }

    #[test]
    fn operator_free_string_uses_truthiness() {
        assert!(evaluate_condition(&json!("something")).unwrap());
        assert!(!evaluate_condition(&json!("false")).unwrap());
        assert!(!evaluate_condition(&json!("0")).unwrap());
        assert!(!evaluate_condition(&json!("null")).unwrap());
    }

    #[test]
    fn empty_and_non_scalar_are_errors() {
        assert_eq!(
            evaluate_condition(&json!("   ")),
            Err(ConditionError::Empty)
        );
        assert!(matches!(
            evaluate_condition(&json!({"a": 1})),
            Err(ConditionError::NotScalar("object"))
        ));
        assert!(matches!(
            evaluate_condition(&json!([1])),
            Err(ConditionError::NotScalar("array"))
        ));
    }
}
