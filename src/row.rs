//! Rows and row-id allocation
//!
//! Row-ids are process-wide monotonic and never reused within a schema
//! lifetime. On open the allocator is seeded above the largest persisted id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Row identifier
pub type RowId = u64;

/// A typed row: id plus column name to value mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Monotonic row identifier
    pub id: RowId,
    /// Column values by column name
    pub payload: HashMap<String, Value>,
}

impl Row {
    /// Create a row with the given id and payload
    pub fn new(id: RowId, payload: HashMap<String, Value>) -> Self {
        Self { id, payload }
    }

    /// Value of a column, Null when absent
    pub fn get(&self, column: &str) -> &Value {
        self.payload.get(column).unwrap_or(&Value::Null)
    }

    /// Set a column value
    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.payload.insert(column.into(), value);
    }
}

/// Monotonic allocator for row-ids
#[derive(Debug)]
pub struct RowIdAllocator {
    next: AtomicU64,
}

impl RowIdAllocator {
    /// Allocator starting at 1
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next row-id
    pub fn next(&self) -> RowId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Raise the floor so future ids exceed `max_seen`
    pub fn bump_past(&self, max_seen: RowId) {
        let mut current = self.next.load(Ordering::SeqCst);
        while current <= max_seen {
            match self.next.compare_exchange(
                current,
                max_seen + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    /// The id the next allocation will return
    pub fn peek(&self) -> RowId {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for RowIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_get_missing_is_null() {
        let row = Row::new(1, HashMap::new());
        assert!(row.get("absent").is_null());
    }

    #[test]
    fn test_allocator_monotonic() {
        let alloc = RowIdAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(b > a);
    }

    #[test]
    fn test_bump_past() {
        let alloc = RowIdAllocator::new();
        alloc.bump_past(100);
        assert_eq!(alloc.next(), 101);

        // Bumping below the floor is a no-op
        alloc.bump_past(5);
        assert_eq!(alloc.next(), 102);
    }
}
