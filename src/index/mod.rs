//! Index layer
//!
//! Indices map scalar keys to row-id sets. The ordered variant supports
//! range scans and cost estimation; the flat variant degrades `get_range`
//! to a full scan. Null is never indexed: callers skip rows whose indexed
//! column is null.
//!
//! Indices are derived and rebuildable: the engine reconstructs them from
//! the row scan at open, so they carry no persisted form of their own and
//! can never make a committed row unreachable.

mod btree;
mod flat;
mod registry;

pub use btree::OrderedIndex;
pub use flat::FlatIndex;
pub use registry::{IndexRegistry, IndexSlot};

use crate::errors::EngineResult;
use crate::keyrange::KeyRange;
use crate::row::RowId;
use crate::value::Value;

/// Contract shared by every index variant
pub trait TableIndex: Send {
    /// Index name
    fn name(&self) -> &str;

    /// Whether keys must map to at most one row
    fn is_unique(&self) -> bool;

    /// Insert a row-id under a key. Fails with CONSTRAINT_VIOLATION when a
    /// unique index already holds the key. Null keys are skipped.
    fn add(&mut self, key: &Value, row_id: RowId) -> EngineResult<()>;

    /// Insert or replace: existing row-ids under the key are dropped first
    fn set(&mut self, key: &Value, row_id: RowId);

    /// Remove one row-id, or every row-id when `row_id` is None
    fn remove(&mut self, key: &Value, row_id: Option<RowId>);

    /// Row-ids for an exact key, in insertion order
    fn get(&self, key: &Value) -> Vec<RowId>;

    /// Row-ids for every key inside the range, in key order.
    /// `None` means the full range.
    fn get_range(&self, range: Option<&KeyRange>) -> Vec<RowId>;

    /// Estimated row count for a range scan. Bounded above by the actual
    /// count and monotone in range width.
    fn cost(&self, range: Option<&KeyRange>) -> usize;

    /// Key order kept by this variant, None when unordered
    fn key_order(&self) -> Option<crate::schema::IndexOrder>;

    /// Smallest key, where the variant keeps key order
    fn min_key(&self) -> Option<Value>;

    /// Largest key, where the variant keeps key order
    fn max_key(&self) -> Option<Value>;

    /// Total number of row-ids held
    fn len(&self) -> usize;

    /// Returns true when no row-id is held
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
