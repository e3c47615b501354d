//! Predicate tree structures
//!
//! A predicate is a value comparison, a join comparison, or a logical
//! combination. Value operands may be bound slots (positional indices into a
//! parameter vector); `bind` produces a fully resolved copy without mutating
//! the original tree. `normalize` pushes NOT to the leaves where a negated
//! comparator exists and flattens nested AND/OR.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};
use crate::value::Value;

/// A qualified column reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Owning table
    pub table: String,
    /// Column name
    pub column: String,
}

impl ColumnRef {
    /// Create a column reference
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Match,
    In,
    Between,
}

impl Comparator {
    /// The comparator expressing the negation, where one exists
    pub fn negated(&self) -> Option<Comparator> {
        match self {
            Comparator::Eq => Some(Comparator::Neq),
            Comparator::Neq => Some(Comparator::Eq),
            Comparator::Lt => Some(Comparator::Gte),
            Comparator::Gte => Some(Comparator::Lt),
            Comparator::Gt => Some(Comparator::Lte),
            Comparator::Lte => Some(Comparator::Gt),
            Comparator::Match | Comparator::In | Comparator::Between => None,
        }
    }

    /// Operator name for explain output
    pub fn op_name(&self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Neq => "neq",
            Comparator::Lt => "lt",
            Comparator::Lte => "lte",
            Comparator::Gt => "gt",
            Comparator::Gte => "gte",
            Comparator::Match => "match",
            Comparator::In => "in",
            Comparator::Between => "between",
        }
    }
}

/// A comparison operand: a literal, a list of literals, or an unbound slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// Resolved value
    Literal(Value),
    /// Resolved list (IN)
    List(Vec<Value>),
    /// Positional bind parameter, resolved by `bind`
    Slot(usize),
}

impl Operand {
    /// Returns true once no slot remains
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Operand::Slot(_))
    }

    /// The literal value, if resolved to one
    pub fn literal(&self) -> Option<&Value> {
        match self {
            Operand::Literal(v) => Some(v),
            _ => None,
        }
    }
}

/// Logical combination operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// A predicate over one or two columns, or a combination of predicates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// column op operand(s)
    Value {
        column: ColumnRef,
        op: Comparator,
        operands: Vec<Operand>,
    },
    /// left op right, across tables
    Join {
        left: ColumnRef,
        right: ColumnRef,
        op: Comparator,
    },
    /// AND / OR / NOT over children
    Combined {
        op: LogicalOp,
        children: Vec<Predicate>,
    },
}

impl Predicate {
    /// column = operand
    pub fn eq(column: ColumnRef, operand: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Eq,
            operands: vec![operand],
        }
    }

    /// column ≠ operand
    pub fn neq(column: ColumnRef, operand: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Neq,
            operands: vec![operand],
        }
    }

    /// column < operand
    pub fn lt(column: ColumnRef, operand: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Lt,
            operands: vec![operand],
        }
    }

    /// column ≤ operand
    pub fn lte(column: ColumnRef, operand: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Lte,
            operands: vec![operand],
        }
    }

    /// column > operand
    pub fn gt(column: ColumnRef, operand: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Gt,
            operands: vec![operand],
        }
    }

    /// column ≥ operand
    pub fn gte(column: ColumnRef, operand: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Gte,
            operands: vec![operand],
        }
    }

    /// column matches a regular expression
    pub fn matches(column: ColumnRef, pattern: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Match,
            operands: vec![pattern],
        }
    }

    /// column ∈ list
    pub fn in_list(column: ColumnRef, list: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::In,
            operands: vec![list],
        }
    }

    /// low ≤ column ≤ high
    pub fn between(column: ColumnRef, low: Operand, high: Operand) -> Self {
        Predicate::Value {
            column,
            op: Comparator::Between,
            operands: vec![low, high],
        }
    }

    /// left = right across tables
    pub fn join(left: ColumnRef, right: ColumnRef) -> Self {
        Predicate::Join {
            left,
            right,
            op: Comparator::Eq,
        }
    }

    /// Conjunction
    pub fn and(children: Vec<Predicate>) -> Self {
        Predicate::Combined {
            op: LogicalOp::And,
            children,
        }
    }

    /// Disjunction
    pub fn or(children: Vec<Predicate>) -> Self {
        Predicate::Combined {
            op: LogicalOp::Or,
            children,
        }
    }

    /// Negation
    pub fn not(child: Predicate) -> Self {
        Predicate::Combined {
            op: LogicalOp::Not,
            children: vec![child],
        }
    }

    /// Returns true once every operand in the tree is resolved
    pub fn is_resolved(&self) -> bool {
        match self {
            Predicate::Value { operands, .. } => operands.iter().all(Operand::is_resolved),
            Predicate::Join { .. } => true,
            Predicate::Combined { children, .. } => children.iter().all(Predicate::is_resolved),
        }
    }

    /// Produce a resolved copy with every slot replaced from `params`.
    ///
    /// The original tree is not mutated. An out-of-range slot is a syntax
    /// error.
    pub fn bind(&self, params: &[Value]) -> EngineResult<Predicate> {
        match self {
            Predicate::Value {
                column,
                op,
                operands,
            } => {
                let mut bound = Vec::with_capacity(operands.len());
                for operand in operands {
                    bound.push(match operand {
                        Operand::Slot(i) => {
                            let value = params.get(*i).ok_or_else(|| {
                                EngineError::Syntax(format!(
                                    "Bind slot {} has no parameter (got {})",
                                    i,
                                    params.len()
                                ))
                            })?;
                            Operand::Literal(value.clone())
                        }
                        resolved => resolved.clone(),
                    });
                }
                Ok(Predicate::Value {
                    column: column.clone(),
                    op: *op,
                    operands: bound,
                })
            }
            Predicate::Join { .. } => Ok(self.clone()),
            Predicate::Combined { op, children } => {
                let bound = children
                    .iter()
                    .map(|c| c.bind(params))
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(Predicate::Combined {
                    op: *op,
                    children: bound,
                })
            }
        }
    }

    /// Normalise the tree: push NOT to the leaves where the comparator has a
    /// negation, and flatten nested AND/OR chains.
    pub fn normalize(&self) -> Predicate {
        self.push_not(false).flatten()
    }

    fn push_not(&self, negate: bool) -> Predicate {
        match self {
            Predicate::Value {
                column,
                op,
                operands,
            } => {
                if !negate {
                    return self.clone();
                }
                match op.negated() {
                    Some(flipped) => Predicate::Value {
                        column: column.clone(),
                        op: flipped,
                        operands: operands.clone(),
                    },
                    // match / in / between have no single negated form
                    None => Predicate::not(self.clone()),
                }
            }
            Predicate::Join { left, right, op } => {
                if !negate {
                    return self.clone();
                }
                match op.negated() {
                    Some(flipped) => Predicate::Join {
                        left: left.clone(),
                        right: right.clone(),
                        op: flipped,
                    },
                    None => Predicate::not(self.clone()),
                }
            }
            Predicate::Combined { op, children } => match op {
                LogicalOp::Not => children[0].push_not(!negate),
                LogicalOp::And => {
                    let inner: Vec<_> = children.iter().map(|c| c.push_not(negate)).collect();
                    if negate {
                        Predicate::or(inner)
                    } else {
                        Predicate::and(inner)
                    }
                }
                LogicalOp::Or => {
                    let inner: Vec<_> = children.iter().map(|c| c.push_not(negate)).collect();
                    if negate {
                        Predicate::and(inner)
                    } else {
                        Predicate::or(inner)
                    }
                }
            },
        }
    }

    fn flatten(&self) -> Predicate {
        match self {
            Predicate::Combined { op, children } if *op != LogicalOp::Not => {
                let mut flat = Vec::new();
                for child in children {
                    match child.flatten() {
                        Predicate::Combined {
                            op: inner_op,
                            children: inner,
                        } if inner_op == *op => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                if flat.len() == 1 {
                    flat.into_iter().next().unwrap()
                } else {
                    Predicate::Combined {
                        op: *op,
                        children: flat,
                    }
                }
            }
            other => other.clone(),
        }
    }

    /// Tables referenced anywhere in the tree
    pub fn tables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.visit_columns(&mut |c| {
            out.insert(c.table.clone());
        });
        out
    }

    /// Visit every column reference in the tree
    pub fn visit_columns<F: FnMut(&ColumnRef)>(&self, f: &mut F) {
        match self {
            Predicate::Value { column, .. } => f(column),
            Predicate::Join { left, right, .. } => {
                f(left);
                f(right);
            }
            Predicate::Combined { children, .. } => {
                for child in children {
                    child.visit_columns(f);
                }
            }
        }
    }

    /// Split a top-level conjunction into its conjuncts
    pub fn conjuncts(&self) -> Vec<&Predicate> {
        match self {
            Predicate::Combined {
                op: LogicalOp::And,
                children,
            } => children.iter().collect(),
            other => vec![other],
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Literal(v) => write!(f, "{}", v),
            Operand::List(values) => {
                write!(f, "(")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, ")")
            }
            Operand::Slot(i) => write!(f, "${}", i),
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Value {
                column,
                op,
                operands,
            } => {
                write!(f, "{} {}", column, op.op_name())?;
                for operand in operands {
                    write!(f, " {}", operand)?;
                }
                Ok(())
            }
            Predicate::Join { left, right, op } => {
                write!(f, "{} {} {}", left, op.op_name(), right)
            }
            Predicate::Combined { op, children } => {
                let name = match op {
                    LogicalOp::And => "and",
                    LogicalOp::Or => "or",
                    LogicalOp::Not => "not",
                };
                write!(f, "{}(", name)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(c: &str) -> ColumnRef {
        ColumnRef::new("movie", c)
    }

    #[test]
    fn test_bind_resolves_slots() {
        let pred = Predicate::between(col("year"), Operand::Slot(0), Operand::Slot(1));
        assert!(!pred.is_resolved());

        let bound = pred
            .bind(&[Value::Integer(1992), Value::Integer(2003)])
            .unwrap();
        assert!(bound.is_resolved());
        // Original unchanged
        assert!(!pred.is_resolved());
    }

    #[test]
    fn test_bind_out_of_range_slot() {
        let pred = Predicate::eq(col("year"), Operand::Slot(3));
        let err = pred.bind(&[Value::Integer(1)]).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::Syntax);
    }

    #[test]
    fn test_rebind_produces_new_tree() {
        let pred = Predicate::eq(col("year"), Operand::Slot(0));
        let a = pred.bind(&[Value::Integer(1990)]).unwrap();
        let b = pred.bind(&[Value::Integer(2000)]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_not_pushed_to_leaves() {
        let pred = Predicate::not(Predicate::and(vec![
            Predicate::eq(col("a"), Operand::Literal(Value::Integer(1))),
            Predicate::lt(col("b"), Operand::Literal(Value::Integer(2))),
        ]));
        let normalized = pred.normalize();

        match normalized {
            Predicate::Combined {
                op: LogicalOp::Or,
                children,
            } => {
                assert!(matches!(
                    &children[0],
                    Predicate::Value {
                        op: Comparator::Neq,
                        ..
                    }
                ));
                assert!(matches!(
                    &children[1],
                    Predicate::Value {
                        op: Comparator::Gte,
                        ..
                    }
                ));
            }
            other => panic!("expected OR at root, got {:?}", other),
        }
    }

    #[test]
    fn test_double_not_cancels() {
        let leaf = Predicate::eq(col("a"), Operand::Literal(Value::Integer(1)));
        let pred = Predicate::not(Predicate::not(leaf.clone()));
        assert_eq!(pred.normalize(), leaf);
    }

    #[test]
    fn test_not_kept_on_between() {
        let pred = Predicate::not(Predicate::between(
            col("year"),
            Operand::Literal(Value::Integer(1990)),
            Operand::Literal(Value::Integer(2000)),
        ));
        // No direct negation: the NOT wrapper survives
        assert!(matches!(
            pred.normalize(),
            Predicate::Combined {
                op: LogicalOp::Not,
                ..
            }
        ));
    }

    #[test]
    fn test_flatten_nested_and() {
        let pred = Predicate::and(vec![
            Predicate::and(vec![
                Predicate::eq(col("a"), Operand::Literal(Value::Integer(1))),
                Predicate::eq(col("b"), Operand::Literal(Value::Integer(2))),
            ]),
            Predicate::eq(col("c"), Operand::Literal(Value::Integer(3))),
        ]);
        match pred.normalize() {
            Predicate::Combined { children, .. } => assert_eq!(children.len(), 3),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_tables_traversal() {
        let pred = Predicate::and(vec![
            Predicate::eq(col("a"), Operand::Literal(Value::Integer(1))),
            Predicate::join(ColumnRef::new("movie", "id"), ColumnRef::new("actor", "movie_id")),
        ]);
        let tables = pred.tables();
        assert!(tables.contains("movie"));
        assert!(tables.contains("actor"));
    }
}
