//! INSERT / UPDATE / DELETE builders

use std::collections::HashMap;

use crate::context::{QueryContext, QueryKind, SetClause};
use crate::database::Database;
use crate::errors::{EngineError, EngineResult};
use crate::predicate::{Operand, Predicate};
use crate::value::Value;

/// Builds an INSERT or INSERT-OR-REPLACE
pub struct InsertBuilder<'a> {
    db: &'a mut Database,
    ctx: QueryContext,
}

impl<'a> InsertBuilder<'a> {
    pub(crate) fn new(db: &'a mut Database, replace: bool) -> Self {
        let kind = if replace {
            QueryKind::InsertOrReplace
        } else {
            QueryKind::Insert
        };
        Self {
            db,
            ctx: QueryContext::new(kind),
        }
    }

    /// Target table
    pub fn into(mut self, table: &str) -> Self {
        self.ctx.from = vec![table.to_string()];
        self
    }

    /// Rows to insert
    pub fn values(mut self, rows: Vec<HashMap<String, Value>>) -> Self {
        self.ctx.rows = rows;
        self
    }

    /// Freeze into an immutable context, validating every reference
    pub fn into_context(self) -> EngineResult<QueryContext> {
        self.validate()?;
        Ok(self.ctx)
    }

    /// Execute; returns the number of rows written
    pub fn exec(self) -> EngineResult<usize> {
        self.validate()?;
        let ctx = self.ctx;
        Ok(self.db.run_write(ctx)?)
    }

    fn validate(&self) -> EngineResult<()> {
        let table_name = self
            .ctx
            .from
            .first()
            .ok_or_else(|| EngineError::Syntax("INSERT without a target table".into()))?;
        let table = self
            .db
            .schema()
            .table(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.clone()))?;
        for payload in &self.ctx.rows {
            for column in payload.keys() {
                if !table.has_column(column) {
                    return Err(EngineError::column_not_found(
                        table_name.as_str(),
                        column.as_str(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Builds an UPDATE
pub struct UpdateBuilder<'a> {
    db: &'a mut Database,
    ctx: QueryContext,
}

impl<'a> UpdateBuilder<'a> {
    pub(crate) fn new(db: &'a mut Database, table: &str) -> Self {
        let mut ctx = QueryContext::new(QueryKind::Update);
        ctx.from = vec![table.to_string()];
        Self { db, ctx }
    }

    /// Assign a literal value
    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.ctx.set_list.push(SetClause {
            column: column.to_string(),
            value: Operand::Literal(value),
        });
        self
    }

    /// Assign from a bind slot
    pub fn set_slot(mut self, column: &str, slot: usize) -> Self {
        self.ctx.set_list.push(SetClause {
            column: column.to_string(),
            value: Operand::Slot(slot),
        });
        self
    }

    /// Restrict the rows to update
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.ctx.where_clause = Some(predicate);
        self
    }

    /// Resolve bind slots
    pub fn bind(mut self, params: &[Value]) -> EngineResult<Self> {
        self.ctx = self.ctx.bind(params)?;
        Ok(self)
    }

    /// Freeze into an immutable context, validating every reference
    pub fn into_context(self) -> EngineResult<QueryContext> {
        self.validate()?;
        Ok(self.ctx)
    }

    /// Execute; returns the number of rows updated
    pub fn exec(self) -> EngineResult<usize> {
        self.validate()?;
        let ctx = self.ctx;
        Ok(self.db.run_write(ctx)?)
    }

    fn validate(&self) -> EngineResult<()> {
        super::validate_context(self.db.schema(), &self.ctx)?;
        let table_name = &self.ctx.from[0];
        let table = self
            .db
            .schema()
            .table(table_name)
            .ok_or_else(|| EngineError::TableNotFound(table_name.clone()))?;
        for clause in &self.ctx.set_list {
            if !table.has_column(&clause.column) {
                return Err(EngineError::column_not_found(
                    table_name.as_str(),
                    clause.column.as_str(),
                ));
            }
        }
        Ok(())
    }
}

/// Builds a DELETE
pub struct DeleteBuilder<'a> {
    db: &'a mut Database,
    ctx: QueryContext,
}

impl<'a> DeleteBuilder<'a> {
    pub(crate) fn new(db: &'a mut Database) -> Self {
        Self {
            db,
            ctx: QueryContext::new(QueryKind::Delete),
        }
    }

    /// Target table
    pub fn from(mut self, table: &str) -> Self {
        self.ctx.from = vec![table.to_string()];
        self
    }

    /// Restrict the rows to delete; without a predicate every row goes
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.ctx.where_clause = Some(predicate);
        self
    }

    /// Resolve bind slots
    pub fn bind(mut self, params: &[Value]) -> EngineResult<Self> {
        self.ctx = self.ctx.bind(params)?;
        Ok(self)
    }

    /// Freeze into an immutable context, validating every reference
    pub fn into_context(self) -> EngineResult<QueryContext> {
        super::validate_context(self.db.schema(), &self.ctx)?;
        Ok(self.ctx)
    }

    /// Execute; returns the number of rows deleted
    pub fn exec(self) -> EngineResult<usize> {
        super::validate_context(self.db.schema(), &self.ctx)?;
        let ctx = self.ctx;
        Ok(self.db.run_write(ctx)?)
    }
}
