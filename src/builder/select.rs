//! SELECT builder

use crate::context::{
    Direction, JoinKind, JoinSpec, OrderBySpec, Projection, QueryContext, QueryKind,
};
use crate::database::Database;
use crate::errors::EngineResult;
use crate::executor::ResultRow;
use crate::predicate::{ColumnRef, Predicate};
use crate::value::Value;

/// Builds a SELECT
pub struct SelectBuilder<'a> {
    db: &'a mut Database,
    ctx: QueryContext,
    /// Fingerprint of the draft before any bind, so an observed template is
    /// recognised when its bound form executes
    template_fingerprint: Option<u64>,
}

impl<'a> SelectBuilder<'a> {
    pub(crate) fn new(db: &'a mut Database, projections: Vec<Projection>) -> Self {
        let mut ctx = QueryContext::new(QueryKind::Select);
        ctx.projections = projections;
        Self {
            db,
            ctx,
            template_fingerprint: None,
        }
    }

    /// Add a from-table; callable once per table
    pub fn from(mut self, table: &str) -> Self {
        self.ctx.from.push(table.to_string());
        self
    }

    /// Set the where predicate
    pub fn where_(mut self, predicate: Predicate) -> Self {
        self.ctx.where_clause = Some(predicate);
        self
    }

    /// Add an inner join
    pub fn inner_join(mut self, table: &str, on: Predicate) -> Self {
        self.ctx.joins.push(JoinSpec {
            kind: JoinKind::Inner,
            table: table.to_string(),
            on,
        });
        self
    }

    /// Add a left outer join; unmatched rows carry nulls for the joined
    /// table's columns
    pub fn left_outer_join(mut self, table: &str, on: Predicate) -> Self {
        self.ctx.joins.push(JoinSpec {
            kind: JoinKind::LeftOuter,
            table: table.to_string(),
            on,
        });
        self
    }

    /// Add an order-by entry
    pub fn order_by(mut self, column: ColumnRef, direction: Direction) -> Self {
        self.ctx.order_by.push(OrderBySpec { column, direction });
        self
    }

    /// Add a group-by column
    pub fn group_by(mut self, column: ColumnRef) -> Self {
        self.ctx.group_by.push(column);
        self
    }

    /// Keep at most `count` rows
    pub fn limit(mut self, count: usize) -> Self {
        self.ctx.limit = Some(count);
        self
    }

    /// Drop the first `count` rows
    pub fn skip(mut self, count: usize) -> Self {
        self.ctx.skip = Some(count);
        self
    }

    /// Resolve bind slots. The draft before the first bind stays the
    /// query's structural template; rebinding yields a logically new query.
    pub fn bind(mut self, params: &[Value]) -> EngineResult<Self> {
        if self.template_fingerprint.is_none() {
            self.template_fingerprint = Some(self.ctx.fingerprint());
        }
        self.ctx = self.ctx.bind(params)?;
        Ok(self)
    }

    /// Freeze into an immutable context, validating every reference
    pub fn into_context(self) -> EngineResult<QueryContext> {
        super::validate_context(self.db.schema(), &self.ctx)?;
        Ok(self.ctx)
    }

    /// Execute and return the projected rows
    pub fn exec(self) -> EngineResult<Vec<ResultRow>> {
        super::validate_context(self.db.schema(), &self.ctx)?;
        let template = self
            .template_fingerprint
            .unwrap_or_else(|| self.ctx.fingerprint());
        self.db.run_select(template, self.ctx)
    }

    /// Render the chosen plan without executing
    pub fn explain(self) -> EngineResult<String> {
        super::validate_context(self.db.schema(), &self.ctx)?;
        self.db.explain(&self.ctx)
    }
}
