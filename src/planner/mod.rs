//! Query planning: physical plans, rewrites, index selection, explain

mod plan;
#[allow(clippy::module_inception)]
mod planner;

pub use plan::PlanNode;
pub use planner::{ranges_for, QueryPlanner};
