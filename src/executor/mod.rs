//! Plan execution: scans, joins, sorting, aggregation, DML staging

mod exec;
mod result;
mod sorter;

pub use exec::QueryExecutor;
pub use result::{ResultRow, StatementResult, WorkRow};
pub use sorter::Sorter;
