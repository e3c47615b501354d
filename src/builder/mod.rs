//! Fluent builders
//!
//! Builders accumulate a mutable draft and freeze it into an immutable
//! `QueryContext` at a terminal verb (`exec`, `explain`, `into_context`).
//! References to unknown tables or columns surface at the terminal verb,
//! never earlier. Builders hand contexts to the database façade; they never
//! touch the planner or runner themselves.

mod dml;
mod select;

pub use dml::{DeleteBuilder, InsertBuilder, UpdateBuilder};
pub use select::SelectBuilder;

use crate::context::{Projection, QueryContext};
use crate::errors::{EngineError, EngineResult};
use crate::predicate::{ColumnRef, Predicate};
use crate::schema::DatabaseSchema;

/// Check every table and column reference of a frozen context
pub(crate) fn validate_context(schema: &DatabaseSchema, ctx: &QueryContext) -> EngineResult<()> {
    let scope = ctx.scope();
    for table in &scope {
        if !schema.has_table(table) {
            return Err(EngineError::TableNotFound(table.clone()));
        }
    }

    let check_column = |column: &ColumnRef| -> EngineResult<()> {
        if !scope.contains(&column.table) {
            return Err(EngineError::Syntax(format!(
                "Column {} references a table outside the query",
                column
            )));
        }
        let table = schema
            .table(&column.table)
            .ok_or_else(|| EngineError::TableNotFound(column.table.clone()))?;
        if !table.has_column(&column.column) {
            return Err(EngineError::column_not_found(
                column.table.as_str(),
                column.column.as_str(),
            ));
        }
        Ok(())
    };

    let mut column_error: Option<EngineError> = None;
    let mut visit = |column: &ColumnRef| {
        if column_error.is_none() {
            if let Err(e) = check_column(column) {
                column_error = Some(e);
            }
        }
    };
    if let Some(predicate) = &ctx.where_clause {
        predicate.visit_columns(&mut visit);
    }
    for join in &ctx.joins {
        join.on.visit_columns(&mut visit);
    }
    if let Some(e) = column_error {
        return Err(e);
    }

    for projection in &ctx.projections {
        match projection {
            Projection::All => {}
            Projection::Column(column) | Projection::Aggregate(_, Some(column)) => {
                check_column(column)?;
            }
            Projection::Aggregate(_, None) => {}
        }
    }
    for spec in &ctx.order_by {
        check_column(&spec.column)?;
    }
    for column in &ctx.group_by {
        check_column(column)?;
    }
    Ok(())
}
