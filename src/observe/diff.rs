//! Result-set diffing
//!
//! Observed queries deliver explicit change events rather than mutating a
//! shared sequence. Rows diff by identity: base rows by their (table,
//! row-id) parts, aggregate rows by payload equality. A row present on both
//! sides under the same identity but with different cells is a
//! modification.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::executor::ResultRow;
use crate::row::RowId;

/// Identity of a result row for diffing purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RowKey {
    /// Base-row identity
    Identity(Vec<(String, Option<RowId>)>),
    /// Payload equality for rows without base identity
    Payload(Vec<(String, crate::value::Value)>),
}

fn key_of(row: &ResultRow) -> RowKey {
    if row.identity.is_empty() {
        RowKey::Payload(row.cells.clone())
    } else {
        RowKey::Identity(row.identity.clone())
    }
}

/// A change delivered to subscribers of an observed query
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Rows present now but not before
    pub added: Vec<ResultRow>,
    /// Rows present before but not now
    pub removed: Vec<ResultRow>,
    /// Rows whose identity survived with different cells (new image)
    pub modified: Vec<ResultRow>,
    /// The full current result set
    pub current: Vec<ResultRow>,
    /// When the change was computed
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    /// True when nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Diff two materialisations of one query
pub fn diff(old: &[ResultRow], new: &[ResultRow]) -> ChangeEvent {
    let mut old_by_key: HashMap<RowKey, Vec<&ResultRow>> = HashMap::new();
    for row in old {
        old_by_key.entry(key_of(row)).or_default().push(row);
    }

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for row in new {
        let key = key_of(row);
        match old_by_key.get_mut(&key) {
            Some(matches) if !matches.is_empty() => {
                let previous = matches.remove(0);
                if previous.cells != row.cells {
                    modified.push(row.clone());
                }
            }
            _ => added.push(row.clone()),
        }
    }

    let removed: Vec<ResultRow> = old_by_key
        .into_values()
        .flatten()
        .cloned()
        .collect();

    ChangeEvent {
        added,
        removed,
        modified,
        current: new.to_vec(),
        timestamp: Utc::now(),
    }
}
