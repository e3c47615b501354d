//! Execution row representations
//!
//! `WorkRow` is the executor's internal tuple: one part per joined table
//! (None for the unmatched side of an outer join) plus computed cells for
//! aggregate outputs. `ResultRow` is the projected output handed to callers
//! and to the observer registry.

use crate::predicate::{ColumnRef, Tuple};
use crate::row::{Row, RowId};
use crate::value::Value;

/// Internal tuple flowing between plan operators
#[derive(Debug, Clone)]
pub struct WorkRow {
    /// One entry per table, in join order
    pub parts: Vec<(String, Option<Row>)>,
    /// Aggregate outputs, labelled like `count(movie.id)`
    pub computed: Vec<(String, Value)>,
}

impl WorkRow {
    /// A tuple over one base row
    pub fn single(table: &str, row: Row) -> Self {
        Self {
            parts: vec![(table.to_string(), Some(row))],
            computed: Vec::new(),
        }
    }

    /// Merge two tuples side by side
    pub fn merge(left: &WorkRow, right: &WorkRow) -> Self {
        let mut parts = left.parts.clone();
        parts.extend(right.parts.iter().cloned());
        Self {
            parts,
            computed: Vec::new(),
        }
    }

    /// A copy of `left` with every part of the unmatched right side null
    pub fn outer(left: &WorkRow, right_tables: &[String]) -> Self {
        let mut parts = left.parts.clone();
        for table in right_tables {
            parts.push((table.clone(), None));
        }
        Self {
            parts,
            computed: Vec::new(),
        }
    }

    /// The base row of a table, when present and matched
    pub fn part(&self, table: &str) -> Option<&Row> {
        self.parts
            .iter()
            .find(|(t, _)| t == table)
            .and_then(|(_, row)| row.as_ref())
    }

    /// A computed cell by label
    pub fn computed_cell(&self, label: &str) -> Option<&Value> {
        self.computed
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v)
    }
}

impl Tuple for WorkRow {
    fn value_of(&self, column: &ColumnRef) -> &Value {
        match self.part(&column.table) {
            Some(row) => row.get(&column.column),
            None => &Value::Null,
        }
    }
}

/// A projected output row
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    /// Projected cells in projection order
    pub cells: Vec<(String, Value)>,
    /// Base-row identity: (table, row-id) per part, None for an unmatched
    /// outer part. Empty for aggregate outputs.
    pub identity: Vec<(String, Option<RowId>)>,
}

impl ResultRow {
    /// Cell value by label
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.cells.iter().find(|(l, _)| l == label).map(|(_, v)| v)
    }
}

/// Output of one executed statement
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    /// SELECT output
    Rows(Vec<ResultRow>),
    /// Rows affected by INSERT / UPDATE / DELETE
    Count(usize),
}

impl StatementResult {
    /// The rows of a SELECT, empty for writes
    pub fn rows(&self) -> &[ResultRow] {
        match self {
            StatementResult::Rows(rows) => rows,
            StatementResult::Count(_) => &[],
        }
    }

    /// Rows affected by a write, 0 for SELECT
    pub fn affected(&self) -> usize {
        match self {
            StatementResult::Rows(_) => 0,
            StatementResult::Count(n) => *n,
        }
    }
}
