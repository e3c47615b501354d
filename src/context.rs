//! Immutable query contexts
//!
//! Builders freeze into a `QueryContext` at their terminal verb. The engine
//! only ever sees contexts; builders never reach the planner or runner
//! directly. `bind` produces a new resolved context with a fresh version,
//! leaving the original untouched. Structural identity (`fingerprint`)
//! collapses semantically equal observed queries to one registry entry.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::errors::EngineResult;
use crate::predicate::{ColumnRef, Operand, Predicate};
use crate::value::Value;

static CONTEXT_VERSION: AtomicU64 = AtomicU64::new(1);

fn next_version() -> u64 {
    CONTEXT_VERSION.fetch_add(1, Ordering::SeqCst)
}

/// Statement kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Select,
    Insert,
    InsertOrReplace,
    Update,
    Delete,
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// One order-by entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBySpec {
    /// Sort column
    pub column: ColumnRef,
    /// Sort direction
    pub direction: Direction,
}

/// Join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

/// One join entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Join flavour
    pub kind: JoinKind,
    /// Joined table
    pub table: String,
    /// Join condition
    pub on: Predicate,
}

/// Aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    /// Function name for projected column labels and explain output
    pub fn fn_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "count",
            AggregateFn::Sum => "sum",
            AggregateFn::Avg => "avg",
            AggregateFn::Min => "min",
            AggregateFn::Max => "max",
        }
    }
}

/// One projected output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Every column of every from-table, in declared order
    All,
    /// A single column
    Column(ColumnRef),
    /// An aggregate over a column (None aggregates the whole row set)
    Aggregate(AggregateFn, Option<ColumnRef>),
}

/// One update assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetClause {
    /// Assigned column
    pub column: String,
    /// New value (may be a bind slot)
    pub value: Operand,
}

/// A frozen query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    /// Statement kind
    pub kind: QueryKind,
    /// Projected outputs; empty means `All`
    pub projections: Vec<Projection>,
    /// From tables in declaration order
    pub from: Vec<String>,
    /// Where predicate
    pub where_clause: Option<Predicate>,
    /// Joins in declaration order
    pub joins: Vec<JoinSpec>,
    /// Order-by entries
    pub order_by: Vec<OrderBySpec>,
    /// Group-by columns
    pub group_by: Vec<ColumnRef>,
    /// Row limit
    pub limit: Option<usize>,
    /// Rows skipped before the limit
    pub skip: Option<usize>,
    /// Insert payloads, without row-ids
    pub rows: Vec<HashMap<String, Value>>,
    /// Update assignments
    pub set_list: Vec<SetClause>,
    /// Monotonic context version, renewed by `bind`
    pub version: u64,
}

impl QueryContext {
    /// A fresh context of the given kind
    pub fn new(kind: QueryKind) -> Self {
        Self {
            kind,
            projections: Vec::new(),
            from: Vec::new(),
            where_clause: None,
            joins: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            limit: None,
            skip: None,
            rows: Vec::new(),
            set_list: Vec::new(),
            version: next_version(),
        }
    }

    /// Every table this query reads or writes, the task scope
    pub fn scope(&self) -> Vec<String> {
        let mut tables = self.from.clone();
        for join in &self.joins {
            if !tables.contains(&join.table) {
                tables.push(join.table.clone());
            }
        }
        tables
    }

    /// Whether this query mutates data
    pub fn is_write(&self) -> bool {
        !matches!(self.kind, QueryKind::Select)
    }

    /// Whether every bind slot is resolved
    pub fn is_resolved(&self) -> bool {
        let where_ok = self
            .where_clause
            .as_ref()
            .map(Predicate::is_resolved)
            .unwrap_or(true);
        let sets_ok = self.set_list.iter().all(|s| s.value.is_resolved());
        where_ok && sets_ok
    }

    /// Resolve every bind slot from `params`, yielding a new context with a
    /// new version. The original context is unchanged.
    pub fn bind(&self, params: &[Value]) -> EngineResult<QueryContext> {
        let mut bound = self.clone();
        if let Some(pred) = &self.where_clause {
            bound.where_clause = Some(pred.bind(params)?);
        }
        for clause in &mut bound.set_list {
            if let Operand::Slot(i) = clause.value {
                let value = params.get(i).ok_or_else(|| {
                    crate::errors::EngineError::Syntax(format!(
                        "Bind slot {} has no parameter (got {})",
                        i,
                        params.len()
                    ))
                })?;
                clause.value = Operand::Literal(value.clone());
            }
        }
        bound.version = next_version();
        Ok(bound)
    }

    /// Structural identity of a query: equal fingerprints mean semantically
    /// equal queries. The version and any insert payloads do not
    /// participate; the where clause is normalised first.
    pub fn fingerprint(&self) -> u64 {
        let normalized = self.where_clause.as_ref().map(Predicate::normalize);
        let identity = (
            &self.kind,
            &self.projections,
            &self.from,
            &normalized,
            &self.joins,
            &self.order_by,
            &self.group_by,
            &self.limit,
            &self.skip,
        );
        let encoded = serde_json::to_string(&identity).unwrap_or_default();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        encoded.hash(&mut hasher);
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_between() -> QueryContext {
        let mut ctx = QueryContext::new(QueryKind::Select);
        ctx.from = vec!["movie".to_string()];
        ctx.where_clause = Some(Predicate::between(
            ColumnRef::new("movie", "year"),
            Operand::Slot(0),
            Operand::Slot(1),
        ));
        ctx
    }

    #[test]
    fn test_bind_renews_version() {
        let ctx = select_between();
        let bound = ctx
            .bind(&[Value::Integer(1992), Value::Integer(2003)])
            .unwrap();
        assert!(bound.is_resolved());
        assert!(!ctx.is_resolved());
        assert!(bound.version > ctx.version);
    }

    #[test]
    fn test_fingerprint_collapses_equal_queries() {
        let a = select_between()
            .bind(&[Value::Integer(1992), Value::Integer(2003)])
            .unwrap();
        let b = select_between()
            .bind(&[Value::Integer(1992), Value::Integer(2003)])
            .unwrap();
        assert_ne!(a.version, b.version);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_parameters() {
        let a = select_between()
            .bind(&[Value::Integer(1992), Value::Integer(2003)])
            .unwrap();
        let b = select_between()
            .bind(&[Value::Integer(1980), Value::Integer(1990)])
            .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_scope_includes_joined_tables() {
        let mut ctx = select_between();
        ctx.joins.push(JoinSpec {
            kind: JoinKind::Inner,
            table: "actor".to_string(),
            on: Predicate::join(
                ColumnRef::new("movie", "id"),
                ColumnRef::new("actor", "movie_id"),
            ),
        });
        assert_eq!(ctx.scope(), vec!["movie".to_string(), "actor".to_string()]);
    }
}
