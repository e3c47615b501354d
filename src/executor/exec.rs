//! Statement execution
//!
//! Walks physical plans against the journal-overlaid cache and stages
//! writes into the journal. Reads see the transaction's own prior writes:
//! journal first, then cache. The cache holds every committed row of the
//! session (hydrated at open, never evicted), so it is authoritative below
//! the journal; the back store is only consulted when the engine opens.

use std::collections::HashMap;

use crate::cache::RowCache;
use crate::context::{AggregateFn, Direction, JoinKind, Projection, QueryContext, QueryKind};
use crate::errors::{EngineError, EngineResult};
use crate::index::IndexRegistry;
use crate::journal::{Journal, Visibility};
use crate::keyrange::KeyRange;
use crate::planner::{PlanNode, QueryPlanner};
use crate::predicate::{ColumnRef, Operand, Tuple};
use crate::row::{Row, RowIdAllocator};
use crate::schema::{DatabaseSchema, TableSchema};
use crate::value::Value;

use super::result::{ResultRow, StatementResult, WorkRow};
use super::sorter::Sorter;

/// Executes statements over the engine state
pub struct QueryExecutor<'a> {
    schema: &'a DatabaseSchema,
    registry: &'a IndexRegistry,
    cache: &'a RowCache,
    allocator: &'a RowIdAllocator,
}

impl<'a> QueryExecutor<'a> {
    /// Create an executor over the current engine state
    pub fn new(
        schema: &'a DatabaseSchema,
        registry: &'a IndexRegistry,
        cache: &'a RowCache,
        allocator: &'a RowIdAllocator,
    ) -> Self {
        Self {
            schema,
            registry,
            cache,
            allocator,
        }
    }

    /// Execute one statement, staging writes into `journal`
    pub fn execute(
        &self,
        ctx: &QueryContext,
        journal: &mut Journal,
    ) -> EngineResult<StatementResult> {
        match ctx.kind {
            QueryKind::Select => self.execute_select(ctx, journal).map(StatementResult::Rows),
            QueryKind::Insert => self.execute_insert(ctx, journal, false),
            QueryKind::InsertOrReplace => self.execute_insert(ctx, journal, true),
            QueryKind::Update => self.execute_update(ctx, journal),
            QueryKind::Delete => self.execute_delete(ctx, journal),
        }
    }

    /// Execute a SELECT and project its rows
    pub fn execute_select(
        &self,
        ctx: &QueryContext,
        journal: &Journal,
    ) -> EngineResult<Vec<ResultRow>> {
        let planner = QueryPlanner::new(self.schema, self.registry, self.cache);
        let plan = planner.plan_select(ctx)?;
        let (projections, child) = match plan {
            PlanNode::Project { projections, child } => (projections, child),
            other => (vec![Projection::All], Box::new(other)),
        };
        let rows = self.walk(&child, journal)?;
        self.project(rows, &projections, ctx)
    }

    fn walk(&self, node: &PlanNode, journal: &Journal) -> EngineResult<Vec<WorkRow>> {
        match node {
            PlanNode::TableAccess { table } => self.scan_table(table, journal),
            PlanNode::IndexRangeScan {
                table,
                column,
                ranges,
                direction,
                ..
            } => self.scan_index(table, column, ranges, *direction, journal),
            PlanNode::Select { predicate, child } => {
                let rows = self.walk(child, journal)?;
                let mut out = Vec::with_capacity(rows.len());
                for row in rows {
                    if predicate.evaluate(&row)? {
                        out.push(row);
                    }
                }
                Ok(out)
            }
            PlanNode::Join {
                kind,
                on,
                left,
                right,
            } => {
                let left_rows = self.walk(left, journal)?;
                let right_rows = self.walk(right, journal)?;
                let right_tables = Self::tables_of(right);
                let mut out = Vec::new();
                for l in &left_rows {
                    let mut matched = false;
                    for r in &right_rows {
                        let candidate = WorkRow::merge(l, r);
                        if on.evaluate(&candidate)? {
                            matched = true;
                            out.push(candidate);
                        }
                    }
                    if !matched && *kind == JoinKind::LeftOuter {
                        out.push(WorkRow::outer(l, &right_tables));
                    }
                }
                Ok(out)
            }
            PlanNode::OrderBy { specs, child } => {
                let mut rows = self.walk(child, journal)?;
                Sorter::sort(&mut rows, specs);
                Ok(rows)
            }
            PlanNode::GroupBy { columns, child } => {
                let rows = self.walk(child, journal)?;
                // A bare group-by keeps one representative per group
                Ok(Self::group(rows, columns)
                    .into_iter()
                    .filter_map(|(_, mut members)| {
                        if members.is_empty() {
                            None
                        } else {
                            Some(members.remove(0))
                        }
                    })
                    .collect())
            }
            PlanNode::Aggregate { aggregates, child } => {
                if let Some(rows) = self.aggregate_from_index(aggregates, child, journal) {
                    return Ok(rows);
                }
                let groups = match child.as_ref() {
                    PlanNode::GroupBy { columns, child } => {
                        let rows = self.walk(child, journal)?;
                        Self::group(rows, columns)
                    }
                    other => vec![(Vec::new(), self.walk(other, journal)?)],
                };
                let mut out = Vec::with_capacity(groups.len());
                for (_, members) in groups {
                    let mut computed = Vec::with_capacity(aggregates.len());
                    for (agg, column) in aggregates {
                        let label = Self::aggregate_label(*agg, column.as_ref());
                        let value = Self::compute_aggregate(*agg, column.as_ref(), &members);
                        computed.push((label, value));
                    }
                    let parts = members
                        .first()
                        .map(|row| row.parts.clone())
                        .unwrap_or_default();
                    out.push(WorkRow { parts, computed });
                }
                Ok(out)
            }
            PlanNode::Skip { count, child } => {
                let rows = self.walk(child, journal)?;
                Ok(rows.into_iter().skip(*count).collect())
            }
            PlanNode::Limit { count, child } => {
                let mut rows = self.walk(child, journal)?;
                rows.truncate(*count);
                Ok(rows)
            }
            PlanNode::Project { child, .. } => self.walk(child, journal),
        }
    }

    fn scan_table(&self, table: &str, journal: &Journal) -> EngineResult<Vec<WorkRow>> {
        let mut ids = self.cache.row_ids(table);
        ids.extend(journal.inserted_ids(table));
        ids.sort_unstable();
        ids.dedup();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match journal.visibility(table, id) {
                Visibility::Deleted => {}
                Visibility::Present(row) => out.push(WorkRow::single(table, row.clone())),
                Visibility::Unchanged => {
                    if let Some(row) = self.cache.peek(table, id) {
                        out.push(WorkRow::single(table, row.clone()));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Index scan with journal overlay: deleted rows vanish, rewritten rows
    /// are re-checked against the ranges under their new key, and rows the
    /// journal adds into the ranges are merged in. The result is re-sorted
    /// by key so the scan stays in key order.
    fn scan_index(
        &self,
        table: &str,
        column: &str,
        ranges: &[KeyRange],
        direction: Direction,
        journal: &Journal,
    ) -> EngineResult<Vec<WorkRow>> {
        let index = self.registry.lookup(table, column).ok_or_else(|| {
            EngineError::Syntax(format!("No index on {}.{}", table, column))
        })?;
        let in_ranges = |v: &Value| ranges.iter().any(|r| r.contains(v));

        let mut rows: Vec<Row> = Vec::new();
        for range in ranges {
            for id in index.get_range(Some(range)) {
                match journal.visibility(table, id) {
                    Visibility::Deleted => {}
                    Visibility::Present(row) => {
                        if in_ranges(row.get(column)) {
                            rows.push(row.clone());
                        }
                    }
                    Visibility::Unchanged => {
                        if let Some(row) = self.cache.peek(table, id) {
                            rows.push(row.clone());
                        }
                    }
                }
            }
        }

        // Journal rows the committed index does not cover yet
        for (_, change) in journal.table_changes(table) {
            if let Some(after) = &change.after {
                if !in_ranges(after.get(column)) {
                    continue;
                }
                let old_covered = change
                    .before
                    .as_ref()
                    .map(|b| in_ranges(b.get(column)))
                    .unwrap_or(false);
                if !old_covered {
                    rows.push(after.clone());
                }
            }
        }

        rows.sort_by(|a, b| {
            let ordering = a.get(column).cmp(b.get(column));
            match direction {
                Direction::Asc => ordering,
                Direction::Desc => ordering.reverse(),
            }
        });
        Ok(rows
            .into_iter()
            .map(|row| WorkRow::single(table, row))
            .collect())
    }

    /// Index-backed MIN/MAX: a bare full scan with a clean journal answers
    /// extremal aggregates straight from the ordered index. Nulls are never
    /// indexed, so the index extremes equal the aggregate over non-null
    /// values. Any condition that could change the answer (a residual
    /// predicate, grouping, pending writes, another aggregate in the mix)
    /// falls back to the scan.
    fn aggregate_from_index(
        &self,
        aggregates: &[(AggregateFn, Option<ColumnRef>)],
        child: &PlanNode,
        journal: &Journal,
    ) -> Option<Vec<WorkRow>> {
        let table = match child {
            PlanNode::TableAccess { table } => table,
            _ => return None,
        };
        if !journal.table_changes(table).is_empty() {
            return None;
        }
        let mut computed = Vec::with_capacity(aggregates.len());
        for (agg, column) in aggregates {
            let column = column.as_ref()?;
            if column.table != *table {
                return None;
            }
            let index = self.registry.lookup(table, &column.column)?;
            index.key_order()?;
            let value = match agg {
                AggregateFn::Min => index.min_key(),
                AggregateFn::Max => index.max_key(),
                _ => return None,
            };
            let label = Self::aggregate_label(*agg, Some(column));
            computed.push((label, value.unwrap_or(Value::Null)));
        }
        Some(vec![WorkRow {
            parts: Vec::new(),
            computed,
        }])
    }

    fn tables_of(node: &PlanNode) -> Vec<String> {
        match node {
            PlanNode::TableAccess { table } | PlanNode::IndexRangeScan { table, .. } => {
                vec![table.clone()]
            }
            PlanNode::Select { child, .. }
            | PlanNode::Project { child, .. }
            | PlanNode::OrderBy { child, .. }
            | PlanNode::GroupBy { child, .. }
            | PlanNode::Aggregate { child, .. }
            | PlanNode::Limit { child, .. }
            | PlanNode::Skip { child, .. } => Self::tables_of(child),
            PlanNode::Join { left, right, .. } => {
                let mut tables = Self::tables_of(left);
                tables.extend(Self::tables_of(right));
                tables
            }
        }
    }

    fn group(rows: Vec<WorkRow>, columns: &[ColumnRef]) -> Vec<(Vec<Value>, Vec<WorkRow>)> {
        let mut order: Vec<Vec<Value>> = Vec::new();
        let mut groups: HashMap<Vec<Value>, Vec<WorkRow>> = HashMap::new();
        for row in rows {
            let key: Vec<Value> = columns
                .iter()
                .map(|c| row.value_of(c).clone())
                .collect();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push(row);
        }
        order
            .into_iter()
            .map(|key| {
                let members = groups.remove(&key).unwrap_or_default();
                (key, members)
            })
            .collect()
    }

    fn aggregate_label(agg: AggregateFn, column: Option<&ColumnRef>) -> String {
        match column {
            Some(c) => format!("{}({})", agg.fn_name(), c),
            None => format!("{}(*)", agg.fn_name()),
        }
    }

    fn compute_aggregate(
        agg: AggregateFn,
        column: Option<&ColumnRef>,
        rows: &[WorkRow],
    ) -> Value {
        let values: Vec<&Value> = match column {
            Some(c) => rows
                .iter()
                .map(|r| r.value_of(c))
                .filter(|v| !v.is_null())
                .collect(),
            None => Vec::new(),
        };
        match agg {
            AggregateFn::Count => match column {
                Some(_) => Value::Integer(values.len() as i64),
                None => Value::Integer(rows.len() as i64),
            },
            AggregateFn::Min => values.iter().min().map(|v| (*v).clone()).unwrap_or(Value::Null),
            AggregateFn::Max => values.iter().max().map(|v| (*v).clone()).unwrap_or(Value::Null),
            AggregateFn::Sum => Self::numeric_sum(&values).unwrap_or(Value::Null),
            AggregateFn::Avg => {
                if values.is_empty() {
                    return Value::Null;
                }
                match Self::numeric_sum(&values) {
                    Some(Value::Integer(total)) => {
                        Value::Real(total as f64 / values.len() as f64)
                    }
                    Some(Value::Real(total)) => Value::Real(total / values.len() as f64),
                    _ => Value::Null,
                }
            }
        }
    }

    fn numeric_sum(values: &[&Value]) -> Option<Value> {
        if values.is_empty() {
            return None;
        }
        let mut int_total: i64 = 0;
        let mut real_total: f64 = 0.0;
        let mut saw_real = false;
        for value in values {
            match value {
                Value::Integer(i) => {
                    int_total += i;
                    real_total += *i as f64;
                }
                Value::Real(r) => {
                    saw_real = true;
                    real_total += r;
                }
                _ => return None,
            }
        }
        Some(if saw_real {
            Value::Real(real_total)
        } else {
            Value::Integer(int_total)
        })
    }

    fn project(
        &self,
        rows: Vec<WorkRow>,
        projections: &[Projection],
        ctx: &QueryContext,
    ) -> EngineResult<Vec<ResultRow>> {
        let multi_table = ctx.scope().len() > 1;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells: Vec<(String, Value)> = Vec::new();
            for projection in projections {
                match projection {
                    Projection::All => {
                        for (table, part) in &row.parts {
                            let table_schema = self
                                .schema
                                .table(table)
                                .ok_or_else(|| EngineError::TableNotFound(table.clone()))?;
                            for column in &table_schema.columns {
                                let label = if multi_table {
                                    format!("{}.{}", table, column.name)
                                } else {
                                    column.name.clone()
                                };
                                let value = part
                                    .as_ref()
                                    .map(|r| r.get(&column.name).clone())
                                    .unwrap_or(Value::Null);
                                cells.push((label, value));
                            }
                        }
                    }
                    Projection::Column(column) => {
                        let label = if multi_table {
                            column.to_string()
                        } else {
                            column.column.clone()
                        };
                        cells.push((label, row.value_of(column).clone()));
                    }
                    Projection::Aggregate(agg, column) => {
                        let label = Self::aggregate_label(*agg, column.as_ref());
                        let value = row
                            .computed_cell(&label)
                            .cloned()
                            .unwrap_or(Value::Null);
                        cells.push((label, value));
                    }
                }
            }
            let identity = if row.computed.is_empty() {
                row.parts
                    .iter()
                    .map(|(table, part)| (table.clone(), part.as_ref().map(|r| r.id)))
                    .collect()
            } else {
                Vec::new()
            };
            out.push(ResultRow { cells, identity });
        }
        Ok(out)
    }

    fn target_table(&self, ctx: &QueryContext) -> EngineResult<&TableSchema> {
        let name = ctx
            .from
            .first()
            .ok_or_else(|| EngineError::Syntax("Statement without a target table".into()))?;
        self.schema
            .table(name)
            .ok_or_else(|| EngineError::TableNotFound(name.clone()))
    }

    fn execute_insert(
        &self,
        ctx: &QueryContext,
        journal: &mut Journal,
        replace: bool,
    ) -> EngineResult<StatementResult> {
        let table = self.target_table(ctx)?;
        let pk_column = match table.primary_key.as_slice() {
            [single] => Some(single.clone()),
            _ => None,
        };
        if replace && pk_column.is_none() {
            return Err(EngineError::Syntax(format!(
                "insert_or_replace on '{}' requires a single-column primary key",
                table.name
            )));
        }

        let mut count = 0;
        for payload in &ctx.rows {
            for column in payload.keys() {
                if !table.has_column(column) {
                    return Err(EngineError::column_not_found(
                        table.name.as_str(),
                        column.as_str(),
                    ));
                }
            }

            let existing = match (&pk_column, replace) {
                (Some(pk), true) => {
                    let key = payload.get(pk).cloned().unwrap_or(Value::Null);
                    self.visible_by_key(&table.name, pk, &key, journal)
                }
                _ => None,
            };

            match existing {
                Some(old) => {
                    let new = Row::new(old.id, payload.clone());
                    journal.update(&table.name, old, new);
                }
                None => {
                    let row = Row::new(self.allocator.next(), payload.clone());
                    journal.insert(&table.name, row);
                }
            }
            count += 1;
        }
        Ok(StatementResult::Count(count))
    }

    /// The visible row holding `key` in `column`, looking through the
    /// journal overlay
    fn visible_by_key(
        &self,
        table: &str,
        column: &str,
        key: &Value,
        journal: &Journal,
    ) -> Option<Row> {
        if key.is_null() {
            return None;
        }
        // Journal post-images first
        for (_, change) in journal.table_changes(table) {
            if let Some(after) = &change.after {
                if after.get(column) == key {
                    return Some(after.clone());
                }
            }
        }
        // Committed rows, via the covering index when one exists
        let candidates = match self.registry.lookup(table, column) {
            Some(index) => index.get(key),
            None => self.cache.row_ids(table),
        };
        for id in candidates {
            match journal.visibility(table, id) {
                Visibility::Deleted | Visibility::Present(_) => continue,
                Visibility::Unchanged => {
                    if let Some(row) = self.cache.peek(table, id) {
                        if row.get(column) == key {
                            return Some(row.clone());
                        }
                    }
                }
            }
        }
        None
    }

    fn execute_update(
        &self,
        ctx: &QueryContext,
        journal: &mut Journal,
    ) -> EngineResult<StatementResult> {
        let table = self.target_table(ctx)?;
        for clause in &ctx.set_list {
            if !table.has_column(&clause.column) {
                return Err(EngineError::column_not_found(
                    table.name.as_str(),
                    clause.column.as_str(),
                ));
            }
        }

        let planner = QueryPlanner::new(self.schema, self.registry, self.cache);
        let plan = planner.plan_target_rows(ctx)?;
        let targets = self.walk(&plan, journal)?;

        let mut count = 0;
        for work in targets {
            let old = match work.part(&table.name) {
                Some(row) => row.clone(),
                None => continue,
            };
            let mut new = old.clone();
            for clause in &ctx.set_list {
                let value = match &clause.value {
                    Operand::Literal(v) => v.clone(),
                    Operand::List(_) => {
                        return Err(EngineError::Syntax(
                            "List value in a set clause".into(),
                        ))
                    }
                    Operand::Slot(i) => {
                        return Err(EngineError::Syntax(format!(
                            "Unbound parameter slot {}",
                            i
                        )))
                    }
                };
                new.set(clause.column.clone(), value);
            }
            journal.update(&table.name, old, new);
            count += 1;
        }
        Ok(StatementResult::Count(count))
    }

    fn execute_delete(
        &self,
        ctx: &QueryContext,
        journal: &mut Journal,
    ) -> EngineResult<StatementResult> {
        let table = self.target_table(ctx)?;
        let planner = QueryPlanner::new(self.schema, self.registry, self.cache);
        let plan = planner.plan_target_rows(ctx)?;
        let targets = self.walk(&plan, journal)?;

        let mut count = 0;
        for work in targets {
            if let Some(row) = work.part(&table.name) {
                journal.delete(&table.name, row.clone());
                count += 1;
            }
        }
        Ok(StatementResult::Count(count))
    }
}
