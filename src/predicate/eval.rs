//! Predicate evaluation
//!
//! Matching is strict: no type coercion, and a null column value never
//! satisfies a comparison. Evaluation requires a fully resolved tree;
//! an unbound slot is a syntax error.

use std::cmp::Ordering;

use regex::Regex;

use crate::errors::{EngineError, EngineResult};
use crate::value::Value;

use super::tree::{ColumnRef, Comparator, LogicalOp, Operand, Predicate};

/// Anything that can resolve a column reference to a value
pub trait Tuple {
    /// The value of `column`, Null when absent
    fn value_of(&self, column: &ColumnRef) -> &Value;
}

/// Compare two values of the same type; None when the types differ
fn compare_same_type(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        (Value::Real(x), Value::Real(y)) => x.partial_cmp(y),
        (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Binary(x), Value::Binary(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn literal<'a>(operand: &'a Operand) -> EngineResult<&'a Value> {
    match operand {
        Operand::Literal(v) => Ok(v),
        Operand::List(_) => Err(EngineError::Syntax(
            "List operand where a single value was expected".into(),
        )),
        Operand::Slot(i) => Err(EngineError::Syntax(format!(
            "Unbound parameter slot {}",
            i
        ))),
    }
}

/// Evaluate a single value comparison
fn eval_value(
    actual: &Value,
    op: Comparator,
    operands: &[Operand],
) -> EngineResult<bool> {
    // Null never matches
    if actual.is_null() {
        return Ok(false);
    }

    match op {
        Comparator::Eq => Ok(actual == literal(&operands[0])?),
        Comparator::Neq => Ok(actual != literal(&operands[0])?),
        Comparator::Lt => Ok(matches!(
            compare_same_type(actual, literal(&operands[0])?),
            Some(Ordering::Less)
        )),
        Comparator::Lte => Ok(matches!(
            compare_same_type(actual, literal(&operands[0])?),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )),
        Comparator::Gt => Ok(matches!(
            compare_same_type(actual, literal(&operands[0])?),
            Some(Ordering::Greater)
        )),
        Comparator::Gte => Ok(matches!(
            compare_same_type(actual, literal(&operands[0])?),
            Some(Ordering::Greater) | Some(Ordering::Equal)
        )),
        Comparator::Match => {
            let pattern = match literal(&operands[0])? {
                Value::Text(p) => p,
                other => {
                    return Err(EngineError::Syntax(format!(
                        "match pattern must be text, got {}",
                        other.type_name()
                    )))
                }
            };
            let re = Regex::new(pattern)
                .map_err(|e| EngineError::Syntax(format!("Invalid match pattern: {}", e)))?;
            match actual {
                Value::Text(s) => Ok(re.is_match(s)),
                _ => Ok(false),
            }
        }
        Comparator::In => match &operands[0] {
            Operand::List(values) => Ok(values.iter().any(|v| v == actual)),
            Operand::Literal(v) => Ok(v == actual),
            Operand::Slot(i) => Err(EngineError::Syntax(format!(
                "Unbound parameter slot {}",
                i
            ))),
        },
        Comparator::Between => {
            let low = literal(&operands[0])?;
            let high = literal(&operands[1])?;
            let above = matches!(
                compare_same_type(actual, low),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            );
            let below = matches!(
                compare_same_type(actual, high),
                Some(Ordering::Less) | Some(Ordering::Equal)
            );
            Ok(above && below)
        }
    }
}

impl Predicate {
    /// Evaluate this predicate against a tuple
    pub fn evaluate<T: Tuple>(&self, tuple: &T) -> EngineResult<bool> {
        match self {
            Predicate::Value {
                column,
                op,
                operands,
            } => eval_value(tuple.value_of(column), *op, operands),
            Predicate::Join { left, right, op } => {
                let lv = tuple.value_of(left);
                let rv = tuple.value_of(right);
                // Null never joins
                if lv.is_null() || rv.is_null() {
                    return Ok(false);
                }
                Ok(match op {
                    Comparator::Eq => lv == rv,
                    Comparator::Neq => lv != rv,
                    Comparator::Lt => {
                        matches!(compare_same_type(lv, rv), Some(Ordering::Less))
                    }
                    Comparator::Lte => matches!(
                        compare_same_type(lv, rv),
                        Some(Ordering::Less) | Some(Ordering::Equal)
                    ),
                    Comparator::Gt => {
                        matches!(compare_same_type(lv, rv), Some(Ordering::Greater))
                    }
                    Comparator::Gte => matches!(
                        compare_same_type(lv, rv),
                        Some(Ordering::Greater) | Some(Ordering::Equal)
                    ),
                    _ => false,
                })
            }
            Predicate::Combined { op, children } => match op {
                LogicalOp::And => {
                    for child in children {
                        if !child.evaluate(tuple)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                LogicalOp::Or => {
                    for child in children {
                        if child.evaluate(tuple)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                LogicalOp::Not => Ok(!children[0].evaluate(tuple)?),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TestTuple(HashMap<String, Value>);

    impl Tuple for TestTuple {
        fn value_of(&self, column: &ColumnRef) -> &Value {
            self.0.get(&column.column).unwrap_or(&Value::Null)
        }
    }

    fn tuple(pairs: &[(&str, Value)]) -> TestTuple {
        TestTuple(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn col(c: &str) -> ColumnRef {
        ColumnRef::new("t", c)
    }

    #[test]
    fn test_eq_no_coercion() {
        let t = tuple(&[("n", Value::Integer(123))]);
        let matches_int = Predicate::eq(col("n"), Operand::Literal(Value::Integer(123)));
        assert!(matches_int.evaluate(&t).unwrap());

        let matches_text = Predicate::eq(col("n"), Operand::Literal(Value::Text("123".into())));
        assert!(!matches_text.evaluate(&t).unwrap());
    }

    #[test]
    fn test_null_never_matches() {
        let t = tuple(&[("n", Value::Null)]);
        let pred = Predicate::neq(col("n"), Operand::Literal(Value::Integer(1)));
        assert!(!pred.evaluate(&t).unwrap());
    }

    #[test]
    fn test_between() {
        let t = tuple(&[("year", Value::Integer(1995))]);
        let pred = Predicate::between(
            col("year"),
            Operand::Literal(Value::Integer(1992)),
            Operand::Literal(Value::Integer(2003)),
        );
        assert!(pred.evaluate(&t).unwrap());

        let outside = tuple(&[("year", Value::Integer(1980))]);
        assert!(!pred.evaluate(&outside).unwrap());
    }

    #[test]
    fn test_in_list() {
        let t = tuple(&[("genre", Value::Text("drama".into()))]);
        let pred = Predicate::in_list(
            col("genre"),
            Operand::List(vec![Value::Text("drama".into()), Value::Text("comedy".into())]),
        );
        assert!(pred.evaluate(&t).unwrap());
    }

    #[test]
    fn test_match_regex() {
        let t = tuple(&[("title", Value::Text("The Matrix".into()))]);
        let pred = Predicate::matches(col("title"), Operand::Literal(Value::Text("^The".into())));
        assert!(pred.evaluate(&t).unwrap());

        let no = Predicate::matches(col("title"), Operand::Literal(Value::Text("^A".into())));
        assert!(!no.evaluate(&t).unwrap());
    }

    #[test]
    fn test_unbound_slot_is_error() {
        let t = tuple(&[("year", Value::Integer(1995))]);
        let pred = Predicate::eq(col("year"), Operand::Slot(0));
        let err = pred.evaluate(&t).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::Syntax);
    }

    #[test]
    fn test_combined_and_or() {
        let t = tuple(&[("a", Value::Integer(5)), ("b", Value::Integer(20))]);
        let pred = Predicate::and(vec![
            Predicate::eq(col("a"), Operand::Literal(Value::Integer(5))),
            Predicate::gt(col("b"), Operand::Literal(Value::Integer(10))),
        ]);
        assert!(pred.evaluate(&t).unwrap());

        let pred = Predicate::or(vec![
            Predicate::eq(col("a"), Operand::Literal(Value::Integer(999))),
            Predicate::gt(col("b"), Operand::Literal(Value::Integer(10))),
        ]);
        assert!(pred.evaluate(&t).unwrap());
    }

    #[test]
    fn test_join_predicate() {
        static FIVE: Value = Value::Integer(5);
        static SIX: Value = Value::Integer(6);

        struct TwoTables;
        impl Tuple for TwoTables {
            fn value_of(&self, column: &ColumnRef) -> &Value {
                match (column.table.as_str(), column.column.as_str()) {
                    ("a", "id") => &FIVE,
                    ("b", "a_id") => &FIVE,
                    _ => &SIX,
                }
            }
        }

        let matched = Predicate::join(ColumnRef::new("a", "id"), ColumnRef::new("b", "a_id"));
        assert!(matched.evaluate(&TwoTables).unwrap());

        let unmatched = Predicate::join(ColumnRef::new("a", "id"), ColumnRef::new("b", "other"));
        assert!(!unmatched.evaluate(&TwoTables).unwrap());
    }
}
