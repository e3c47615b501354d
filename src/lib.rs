//! lumadb - an in-process relational query engine with observable queries
//!
//! Applications declare a typed schema, issue queries through fluent
//! builders, and subscribe to live SELECTs. The engine plans queries
//! against ordered indices, executes them as serialised tasks over a
//! transactional back store, and delivers structured diffs whenever a
//! commit changes the rows an observed query returns.

pub mod backstore;
pub mod builder;
pub mod cache;
pub mod context;
pub mod database;
pub mod errors;
pub mod executor;
pub mod index;
pub mod journal;
pub mod keyrange;
pub mod observability;
pub mod observe;
pub mod planner;
pub mod predicate;
pub mod row;
pub mod runner;
pub mod schema;
pub mod value;

pub use backstore::{BackStore, MemoryStore, StoreTx, TxMode};
pub use context::{
    AggregateFn, Direction, JoinKind, Projection, QueryContext, QueryKind,
};
pub use database::{Database, Transaction, UpgradeHook};
pub use errors::{EngineError, EngineResult, ErrorCode};
pub use executor::{ResultRow, StatementResult};
pub use keyrange::KeyRange;
pub use observe::{ChangeEvent, SubscriptionId};
pub use predicate::{ColumnRef, Comparator, Operand, Predicate};
pub use row::{Row, RowId};
pub use schema::{Column, ColumnType, DatabaseSchema, IndexDef, IndexOrder, TableSchema};
pub use value::Value;

/// Shorthand for a qualified column reference
pub fn col(table: &str, column: &str) -> ColumnRef {
    ColumnRef::new(table, column)
}
