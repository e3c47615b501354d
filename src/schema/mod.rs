//! Typed schema metadata: tables, columns, indices, constraints

mod types;

pub use types::{Column, ColumnType, DatabaseSchema, IndexDef, IndexOrder, TableSchema};
