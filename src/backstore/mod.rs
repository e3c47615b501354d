//! Back store contract
//!
//! The engine's lower boundary: a durable per-table key→payload mapping with
//! multi-table transactions. Two transactions with disjoint scopes may run
//! in parallel; overlapping scopes are serialised by the runner, so a store
//! only has to be safe under that policy. Payloads are opaque to the store;
//! the engine writes serialised rows keyed by row-id.

mod memory;

pub use memory::MemoryStore;

use crate::errors::EngineResult;
use crate::row::RowId;
use crate::schema::DatabaseSchema;

/// Transaction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// A transaction over a set of tables
pub trait StoreTx: Send {
    /// Read one payload
    fn get(&self, table: &str, row_id: RowId) -> EngineResult<Option<Vec<u8>>>;

    /// Stage a write (visible to this tx only until commit)
    fn put(&mut self, table: &str, row_id: RowId, payload: Vec<u8>) -> EngineResult<()>;

    /// Stage a delete
    fn delete(&mut self, table: &str, row_id: RowId) -> EngineResult<()>;

    /// All rows of a table in ascending key order, committed state plus this
    /// tx's staged writes
    fn scan(&self, table: &str) -> EngineResult<Vec<(RowId, Vec<u8>)>>;

    /// Largest key in a table, used for row-id recovery at open
    fn max_key(&self, table: &str) -> EngineResult<Option<RowId>>;

    /// Apply staged writes atomically
    fn commit(self: Box<Self>) -> EngineResult<()>;

    /// Discard staged writes
    fn abort(self: Box<Self>);
}

/// A durable key→payload store
pub trait BackStore: Send {
    /// Prepare the store for a schema: create missing tables
    fn open(&mut self, schema: &DatabaseSchema) -> EngineResult<()>;

    /// Schema version recorded by the last open, None on first use
    fn stored_version(&self) -> EngineResult<Option<u32>>;

    /// Record the schema version
    fn set_version(&mut self, version: u32) -> EngineResult<()>;

    /// Begin a transaction over `scope`
    fn begin(&self, mode: TxMode, scope: &[String]) -> EngineResult<Box<dyn StoreTx>>;

    /// Release resources; further transactions fail
    fn close(&mut self);
}
