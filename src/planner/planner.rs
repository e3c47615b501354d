//! Query planner
//!
//! Turns an immutable query context into a physical plan. Rewrites run in a
//! fixed order, each a local tree transformation:
//!
//! 1. Predicate normalisation (NOT to leaves, AND/OR flattened)
//! 2. Pushdown of single-table conjuncts to their table access
//! 3. Index substitution where a conjunct translates to key ranges and the
//!    index estimates cheaper than a full scan
//! 4. Join order: enumerate up to three tables, greedy smallest-first beyond
//! 5. Limit/skip pushdown past Project, and past OrderBy when the scan
//!    already delivers the requested order
//!
//! Planning is deterministic: equal inputs give equal plans, ties broken
//! lexicographically by column name.

use std::collections::HashMap;

use crate::cache::RowCache;
use crate::context::{Direction, JoinKind, Projection, QueryContext};
use crate::errors::{EngineError, EngineResult};
use crate::index::IndexRegistry;
use crate::keyrange::KeyRange;
use crate::predicate::{Comparator, LogicalOp, Operand, Predicate};
use crate::schema::{DatabaseSchema, IndexOrder};

use super::plan::PlanNode;

/// Translate a comparison into a union of key ranges, in key order.
/// Unresolved slots and pattern matches do not translate.
pub fn ranges_for(op: Comparator, operands: &[Operand]) -> Option<Vec<KeyRange>> {
    let lit = |i: usize| operands.get(i).and_then(Operand::literal).cloned();
    match op {
        Comparator::Eq => Some(vec![KeyRange::only(lit(0)?)]),
        Comparator::Neq => Some(KeyRange::only(lit(0)?).complement()),
        Comparator::Lt => Some(vec![KeyRange::upper_bound(lit(0)?, true)]),
        Comparator::Lte => Some(vec![KeyRange::upper_bound(lit(0)?, false)]),
        Comparator::Gt => Some(vec![KeyRange::lower_bound(lit(0)?, true)]),
        Comparator::Gte => Some(vec![KeyRange::lower_bound(lit(0)?, false)]),
        Comparator::Between => Some(vec![KeyRange::range(
            Some(lit(0)?),
            Some(lit(1)?),
            false,
            false,
        )]),
        Comparator::In => match operands.first()? {
            Operand::List(values) => {
                let mut sorted = values.clone();
                sorted.sort();
                sorted.dedup();
                Some(sorted.into_iter().map(KeyRange::only).collect())
            }
            Operand::Literal(v) => Some(vec![KeyRange::only(v.clone())]),
            Operand::Slot(_) => None,
        },
        Comparator::Match => None,
    }
}

/// A chosen index scan candidate
struct IndexChoice {
    conjunct: usize,
    column: String,
    index: String,
    ranges: Vec<KeyRange>,
    direction: Direction,
    cost: usize,
}

/// Plans query contexts against a schema, its indices, and current table
/// sizes
pub struct QueryPlanner<'a> {
    schema: &'a DatabaseSchema,
    registry: &'a IndexRegistry,
    cache: &'a RowCache,
}

impl<'a> QueryPlanner<'a> {
    /// Create a planner over the current engine state
    pub fn new(
        schema: &'a DatabaseSchema,
        registry: &'a IndexRegistry,
        cache: &'a RowCache,
    ) -> Self {
        Self {
            schema,
            registry,
            cache,
        }
    }

    /// Plan a SELECT context
    pub fn plan_select(&self, ctx: &QueryContext) -> EngineResult<PlanNode> {
        if ctx.from.is_empty() {
            return Err(EngineError::Syntax("SELECT without a from table".into()));
        }
        for table in ctx.scope() {
            if !self.schema.has_table(&table) {
                return Err(EngineError::TableNotFound(table));
            }
        }

        // Rewrite 1: normalise the predicate
        let normalized = ctx.where_clause.as_ref().map(Predicate::normalize);

        // Rewrite 2: push single-table conjuncts to their table
        let (per_table, global) = self.partition(&normalized, ctx);

        // Rewrite 3: per-table scans with index substitution
        let mut sources: Vec<(String, PlanNode, usize)> = Vec::new();
        for table in &ctx.from {
            let conjuncts = per_table.get(table).cloned().unwrap_or_default();
            let (plan, estimate) = self.scan_for(table, conjuncts);
            sources.push((table.clone(), plan, estimate));
        }

        // Rewrite 4: join order over the from-tables, then declared joins
        let mut plan = self.join_sources(sources);
        for join in &ctx.joins {
            let conjuncts = per_table.get(&join.table).cloned().unwrap_or_default();
            let (right, _) = self.scan_for(&join.table, conjuncts);
            plan = PlanNode::Join {
                kind: join.kind,
                on: join.on.clone(),
                left: Box::new(plan),
                right: Box::new(right),
            };
        }

        // Conjuncts spanning several tables stay above the joins
        if !global.is_empty() {
            let predicate = if global.len() == 1 {
                global.into_iter().next().unwrap()
            } else {
                Predicate::and(global)
            };
            plan = PlanNode::Select {
                predicate,
                child: Box::new(plan),
            };
        }

        // Grouping and aggregates
        let aggregates: Vec<_> = ctx
            .projections
            .iter()
            .filter_map(|p| match p {
                Projection::Aggregate(agg, column) => Some((*agg, column.clone())),
                _ => None,
            })
            .collect();
        let has_aggregates = !aggregates.is_empty();
        if !ctx.group_by.is_empty() {
            plan = PlanNode::GroupBy {
                columns: ctx.group_by.clone(),
                child: Box::new(plan),
            };
        }
        if has_aggregates {
            plan = PlanNode::Aggregate {
                aggregates,
                child: Box::new(plan),
            };
        }

        // Rewrite 5: limit/skip placement
        let ordering_satisfied =
            !has_aggregates && self.ordering_satisfied(&plan, ctx);
        let push_below_order_by = ctx.order_by.is_empty() || ordering_satisfied;

        if !has_aggregates && push_below_order_by {
            plan = Self::wrap_limit_skip(plan, ctx);
        }
        if !ctx.order_by.is_empty() {
            plan = PlanNode::OrderBy {
                specs: ctx.order_by.clone(),
                child: Box::new(plan),
            };
        }
        if has_aggregates || !push_below_order_by {
            plan = Self::wrap_limit_skip(plan, ctx);
        }

        let projections = if ctx.projections.is_empty() {
            vec![Projection::All]
        } else {
            ctx.projections.clone()
        };
        Ok(PlanNode::Project {
            projections,
            child: Box::new(plan),
        })
    }

    /// Plan the scan locating rows a DELETE or UPDATE targets
    pub fn plan_target_rows(&self, ctx: &QueryContext) -> EngineResult<PlanNode> {
        let table = ctx
            .from
            .first()
            .ok_or_else(|| EngineError::Syntax("Statement without a target table".into()))?;
        if !self.schema.has_table(table) {
            return Err(EngineError::TableNotFound(table.clone()));
        }
        let normalized = ctx.where_clause.as_ref().map(Predicate::normalize);
        let conjuncts = match &normalized {
            Some(p) => p.conjuncts().into_iter().cloned().collect(),
            None => Vec::new(),
        };
        let (plan, _) = self.scan_for(table, conjuncts);
        Ok(plan)
    }

    fn partition(
        &self,
        normalized: &Option<Predicate>,
        ctx: &QueryContext,
    ) -> (HashMap<String, Vec<Predicate>>, Vec<Predicate>) {
        let mut per_table: HashMap<String, Vec<Predicate>> = HashMap::new();
        let mut global = Vec::new();
        let scope = ctx.scope();
        if let Some(predicate) = normalized {
            for conjunct in predicate.conjuncts() {
                let tables = conjunct.tables();
                if tables.len() == 1 {
                    let table = tables.into_iter().next().unwrap();
                    if scope.contains(&table) {
                        per_table.entry(table).or_default().push(conjunct.clone());
                        continue;
                    }
                }
                global.push(conjunct.clone());
            }
        }
        (per_table, global)
    }

    /// Build the scan for one table: an index range scan when a conjunct
    /// translates to ranges estimated cheaper than the full table, else a
    /// table access. Remaining conjuncts become a residual select.
    fn scan_for(&self, table: &str, conjuncts: Vec<Predicate>) -> (PlanNode, usize) {
        let table_len = self.cache.table_len(table);

        let mut best: Option<IndexChoice> = None;
        for (i, conjunct) in conjuncts.iter().enumerate() {
            let Some((column, ranges)) = self.indexable(conjunct) else {
                continue;
            };
            let Some(index) = self.registry.lookup(table, &column) else {
                continue;
            };
            let cost: usize = ranges.iter().map(|r| index.cost(Some(r))).sum();
            if cost >= table_len {
                continue;
            }
            let better = match &best {
                None => true,
                Some(current) => {
                    cost < current.cost || (cost == current.cost && column < current.column)
                }
            };
            if better {
                let direction = match index.key_order() {
                    Some(IndexOrder::Desc) => Direction::Desc,
                    _ => Direction::Asc,
                };
                best = Some(IndexChoice {
                    conjunct: i,
                    column,
                    index: index.name().to_string(),
                    ranges,
                    direction,
                    cost,
                });
            }
        }

        match best {
            Some(choice) => {
                let scan = PlanNode::IndexRangeScan {
                    table: table.to_string(),
                    column: choice.column,
                    index: choice.index,
                    ranges: choice.ranges,
                    direction: choice.direction,
                };
                let residual: Vec<Predicate> = conjuncts
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| *i != choice.conjunct)
                    .map(|(_, c)| c)
                    .collect();
                (Self::wrap_select(scan, residual), choice.cost)
            }
            None => {
                let scan = PlanNode::TableAccess {
                    table: table.to_string(),
                };
                (Self::wrap_select(scan, conjuncts), table_len)
            }
        }
    }

    fn wrap_select(scan: PlanNode, conjuncts: Vec<Predicate>) -> PlanNode {
        if conjuncts.is_empty() {
            return scan;
        }
        let predicate = if conjuncts.len() == 1 {
            conjuncts.into_iter().next().unwrap()
        } else {
            Predicate::and(conjuncts)
        };
        PlanNode::Select {
            predicate,
            child: Box::new(scan),
        }
    }

    /// A conjunct is indexable when it is a comparison on one column that
    /// translates to ranges, or an OR whose children all compare the same
    /// column. For the OR the union of ranges is scanned; the planner picks
    /// the cheapest indexable conjunct overall.
    fn indexable(&self, conjunct: &Predicate) -> Option<(String, Vec<KeyRange>)> {
        match conjunct {
            Predicate::Value {
                column,
                op,
                operands,
            } => ranges_for(*op, operands).map(|ranges| (column.column.clone(), ranges)),
            Predicate::Combined {
                op: LogicalOp::Or,
                children,
            } => {
                let mut column: Option<String> = None;
                let mut ranges = Vec::new();
                for child in children {
                    let (child_column, child_ranges) = match child {
                        Predicate::Value {
                            column,
                            op,
                            operands,
                        } => (column.column.clone(), ranges_for(*op, operands)?),
                        _ => return None,
                    };
                    match &column {
                        None => column = Some(child_column),
                        Some(c) if *c == child_column => {}
                        Some(_) => return None,
                    }
                    ranges.extend(child_ranges);
                }
                ranges.sort_by(|a, b| a.from.cmp(&b.from));
                column.map(|c| (c, ranges))
            }
            _ => None,
        }
    }

    /// Left-deep join tree over the from-tables. Up to three tables every
    /// order is scored; beyond that the smallest source leads and the rest
    /// follow by ascending estimate. Cross joins carry an empty (always
    /// true) condition; real conditions arrive via the declared joins or
    /// the residual select.
    fn join_sources(&self, mut sources: Vec<(String, PlanNode, usize)>) -> PlanNode {
        if sources.len() == 1 {
            return sources.remove(0).1;
        }

        let order: Vec<usize> = if sources.len() <= 3 {
            Self::enumerate_order(&sources)
        } else {
            let mut idx: Vec<usize> = (0..sources.len()).collect();
            idx.sort_by_key(|&i| (sources[i].2, sources[i].0.clone()));
            idx
        };

        let mut ordered: Vec<Option<PlanNode>> =
            sources.into_iter().map(|(_, plan, _)| Some(plan)).collect();
        let mut iter = order.into_iter();
        // order is a permutation of the source indices, each taken once
        let mut plan = ordered[iter.next().unwrap()].take().unwrap();
        for i in iter {
            plan = PlanNode::Join {
                kind: JoinKind::Inner,
                on: Predicate::and(Vec::new()),
                left: Box::new(plan),
                right: Box::new(ordered[i].take().unwrap()),
            };
        }
        plan
    }

    /// Score every permutation of up to three sources by the sum of
    /// intermediate result estimates; smallest wins, name order breaks ties
    fn enumerate_order(sources: &[(String, PlanNode, usize)]) -> Vec<usize> {
        let n = sources.len();
        let mut permutations: Vec<Vec<usize>> = Vec::new();
        let mut indices: Vec<usize> = (0..n).collect();
        Self::permute(&mut indices, 0, &mut permutations);

        permutations
            .into_iter()
            .map(|perm| {
                let mut acc = sources[perm[0]].2;
                let mut score = 0usize;
                for &i in &perm[1..] {
                    acc = acc.saturating_mul(sources[i].2.max(1));
                    score = score.saturating_add(acc);
                }
                let names: Vec<&str> = perm.iter().map(|&i| sources[i].0.as_str()).collect();
                (score, names.join(","), perm)
            })
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, _, perm)| perm)
            .unwrap_or_else(|| (0..n).collect())
    }

    fn permute(indices: &mut Vec<usize>, start: usize, out: &mut Vec<Vec<usize>>) {
        if start == indices.len() {
            out.push(indices.clone());
            return;
        }
        for i in start..indices.len() {
            indices.swap(start, i);
            Self::permute(indices, start + 1, out);
            indices.swap(start, i);
        }
    }

    /// True when the base scan already delivers the requested order: one
    /// order-by entry over the scanned column, same direction
    fn ordering_satisfied(&self, plan: &PlanNode, ctx: &QueryContext) -> bool {
        if ctx.order_by.len() != 1 {
            return false;
        }
        let spec = &ctx.order_by[0];
        match plan.base_scan() {
            PlanNode::IndexRangeScan {
                table,
                column,
                direction,
                ..
            } => {
                spec.column.table == *table
                    && spec.column.column == *column
                    && spec.direction == *direction
            }
            _ => false,
        }
    }

    fn wrap_limit_skip(mut plan: PlanNode, ctx: &QueryContext) -> PlanNode {
        if let Some(skip) = ctx.skip {
            plan = PlanNode::Skip {
                count: skip,
                child: Box::new(plan),
            };
        }
        if let Some(limit) = ctx.limit {
            plan = PlanNode::Limit {
                count: limit,
                child: Box::new(plan),
            };
        }
        plan
    }
}
