//! Physical plan tree
//!
//! The planner output: a tree of physical operators the executor walks.
//! `explain` renders the tree indented, children two spaces deeper than
//! their parent.

use crate::context::{AggregateFn, Direction, JoinKind, OrderBySpec, Projection};
use crate::keyrange::KeyRange;
use crate::predicate::{ColumnRef, Predicate};

/// A physical operator
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Full scan of a table in row-id order
    TableAccess { table: String },
    /// Scan of an index over a union of key ranges, in key order
    IndexRangeScan {
        table: String,
        column: String,
        index: String,
        ranges: Vec<KeyRange>,
        direction: Direction,
    },
    /// Filter by predicate
    Select {
        predicate: Predicate,
        child: Box<PlanNode>,
    },
    /// Column projection
    Project {
        projections: Vec<Projection>,
        child: Box<PlanNode>,
    },
    /// Nested-loop join
    Join {
        kind: JoinKind,
        on: Predicate,
        left: Box<PlanNode>,
        right: Box<PlanNode>,
    },
    /// Stable sort
    OrderBy {
        specs: Vec<OrderBySpec>,
        child: Box<PlanNode>,
    },
    /// Grouping by column values
    GroupBy {
        columns: Vec<ColumnRef>,
        child: Box<PlanNode>,
    },
    /// Aggregate computation, per group when a GroupBy sits below
    Aggregate {
        aggregates: Vec<(AggregateFn, Option<ColumnRef>)>,
        child: Box<PlanNode>,
    },
    /// Keep at most `count` rows
    Limit { count: usize, child: Box<PlanNode> },
    /// Drop the first `count` rows
    Skip { count: usize, child: Box<PlanNode> },
}

impl PlanNode {
    /// Render the plan as an indented tree
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.render(0, &mut out);
        out
    }

    fn render(&self, depth: usize, out: &mut String) {
        for _ in 0..depth {
            out.push_str("  ");
        }
        match self {
            PlanNode::TableAccess { table } => {
                out.push_str(&format!("table_access({})\n", table));
            }
            PlanNode::IndexRangeScan {
                table,
                column,
                index,
                ranges,
                direction,
            } => {
                let rendered: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
                out.push_str(&format!(
                    "index_range_scan({}.{}, {}, [{}], {})\n",
                    table,
                    column,
                    index,
                    rendered.join(" ∪ "),
                    match direction {
                        Direction::Asc => "asc",
                        Direction::Desc => "desc",
                    }
                ));
            }
            PlanNode::Select { predicate, child } => {
                out.push_str(&format!("select({})\n", predicate));
                child.render(depth + 1, out);
            }
            PlanNode::Project { projections, child } => {
                let rendered: Vec<String> = projections
                    .iter()
                    .map(|p| match p {
                        Projection::All => "*".to_string(),
                        Projection::Column(c) => c.to_string(),
                        Projection::Aggregate(agg, Some(c)) => {
                            format!("{}({})", agg.fn_name(), c)
                        }
                        Projection::Aggregate(agg, None) => format!("{}(*)", agg.fn_name()),
                    })
                    .collect();
                out.push_str(&format!("project({})\n", rendered.join(", ")));
                child.render(depth + 1, out);
            }
            PlanNode::Join {
                kind,
                on,
                left,
                right,
            } => {
                let kind_name = match kind {
                    JoinKind::Inner => "inner",
                    JoinKind::LeftOuter => "left_outer",
                };
                out.push_str(&format!("join({}, {})\n", kind_name, on));
                left.render(depth + 1, out);
                right.render(depth + 1, out);
            }
            PlanNode::OrderBy { specs, child } => {
                let rendered: Vec<String> = specs
                    .iter()
                    .map(|s| {
                        format!(
                            "{} {}",
                            s.column,
                            match s.direction {
                                Direction::Asc => "asc",
                                Direction::Desc => "desc",
                            }
                        )
                    })
                    .collect();
                out.push_str(&format!("order_by({})\n", rendered.join(", ")));
                child.render(depth + 1, out);
            }
            PlanNode::GroupBy { columns, child } => {
                let rendered: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                out.push_str(&format!("group_by({})\n", rendered.join(", ")));
                child.render(depth + 1, out);
            }
            PlanNode::Aggregate { aggregates, child } => {
                let rendered: Vec<String> = aggregates
                    .iter()
                    .map(|(agg, column)| match column {
                        Some(c) => format!("{}({})", agg.fn_name(), c),
                        None => format!("{}(*)", agg.fn_name()),
                    })
                    .collect();
                out.push_str(&format!("aggregate({})\n", rendered.join(", ")));
                child.render(depth + 1, out);
            }
            PlanNode::Limit { count, child } => {
                out.push_str(&format!("limit({})\n", count));
                child.render(depth + 1, out);
            }
            PlanNode::Skip { count, child } => {
                out.push_str(&format!("skip({})\n", count));
                child.render(depth + 1, out);
            }
        }
    }

    /// The scan at the bottom of a chain of order-preserving operators
    pub fn base_scan(&self) -> &PlanNode {
        match self {
            PlanNode::Select { child, .. } => child.base_scan(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::Operand;
    use crate::value::Value;

    #[test]
    fn test_explain_indentation() {
        let plan = PlanNode::Project {
            projections: vec![Projection::All],
            child: Box::new(PlanNode::Select {
                predicate: Predicate::gt(
                    ColumnRef::new("t", "b"),
                    Operand::Literal(Value::Integer(10)),
                ),
                child: Box::new(PlanNode::TableAccess {
                    table: "t".to_string(),
                }),
            }),
        };
        let rendered = plan.explain();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "project(*)");
        assert_eq!(lines[1], "  select(t.b gt 10)");
        assert_eq!(lines[2], "    table_access(t)");
    }

    #[test]
    fn test_base_scan_peels_selects() {
        let scan = PlanNode::TableAccess {
            table: "t".to_string(),
        };
        let plan = PlanNode::Select {
            predicate: Predicate::eq(
                ColumnRef::new("t", "a"),
                Operand::Literal(Value::Integer(1)),
            ),
            child: Box::new(scan.clone()),
        };
        assert_eq!(plan.base_scan(), &scan);
    }
}
