//! In-memory back store
//!
//! Reference implementation of the back-store contract. State lives behind a
//! shared handle, so a clone observes the same data; closing one handle and
//! opening another models a process restart without durable media.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::errors::{EngineError, EngineResult};
use crate::row::RowId;
use crate::schema::DatabaseSchema;

use super::{BackStore, StoreTx, TxMode};

#[derive(Debug, Default)]
struct Inner {
    tables: HashMap<String, BTreeMap<RowId, Vec<u8>>>,
    version: Option<u32>,
    closed: bool,
}

/// Shared-handle in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> EngineResult<std::sync::RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| EngineError::BackStore("Store lock poisoned".into()))
    }

    fn write(&self) -> EngineResult<std::sync::RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| EngineError::BackStore("Store lock poisoned".into()))
    }
}

impl BackStore for MemoryStore {
    fn open(&mut self, schema: &DatabaseSchema) -> EngineResult<()> {
        let mut inner = self.write()?;
        inner.closed = false;
        for table in &schema.tables {
            inner.tables.entry(table.name.clone()).or_default();
        }
        Ok(())
    }

    fn stored_version(&self) -> EngineResult<Option<u32>> {
        Ok(self.read()?.version)
    }

    fn set_version(&mut self, version: u32) -> EngineResult<()> {
        self.write()?.version = Some(version);
        Ok(())
    }

    fn begin(&self, mode: TxMode, scope: &[String]) -> EngineResult<Box<dyn StoreTx>> {
        let inner = self.read()?;
        if inner.closed {
            return Err(EngineError::BackStore("Store is closed".into()));
        }
        for table in scope {
            if !inner.tables.contains_key(table) {
                return Err(EngineError::BackStore(format!(
                    "Unknown table '{}' in transaction scope",
                    table
                )));
            }
        }
        drop(inner);
        Ok(Box::new(MemoryTx {
            store: self.inner.clone(),
            mode,
            scope: scope.iter().cloned().collect(),
            staged: Vec::new(),
        }))
    }

    fn close(&mut self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.closed = true;
        }
    }
}

enum StagedOp {
    Put(String, RowId, Vec<u8>),
    Delete(String, RowId),
}

/// A transaction against the shared state
pub struct MemoryTx {
    store: Arc<RwLock<Inner>>,
    mode: TxMode,
    scope: HashSet<String>,
    staged: Vec<StagedOp>,
}

impl MemoryTx {
    fn check_scope(&self, table: &str) -> EngineResult<()> {
        if !self.scope.contains(table) {
            return Err(EngineError::BackStore(format!(
                "Table '{}' is outside the transaction scope",
                table
            )));
        }
        Ok(())
    }

    fn check_writable(&self, table: &str) -> EngineResult<()> {
        self.check_scope(table)?;
        if self.mode != TxMode::ReadWrite {
            return Err(EngineError::BackStore(
                "Write attempted in a read-only transaction".into(),
            ));
        }
        Ok(())
    }
}

impl StoreTx for MemoryTx {
    fn get(&self, table: &str, row_id: RowId) -> EngineResult<Option<Vec<u8>>> {
        self.check_scope(table)?;
        // The tx observes its own staged writes
        for op in self.staged.iter().rev() {
            match op {
                StagedOp::Put(t, id, payload) if t == table && *id == row_id => {
                    return Ok(Some(payload.clone()))
                }
                StagedOp::Delete(t, id) if t == table && *id == row_id => return Ok(None),
                _ => {}
            }
        }
        let inner = self
            .store
            .read()
            .map_err(|_| EngineError::BackStore("Store lock poisoned".into()))?;
        Ok(inner
            .tables
            .get(table)
            .and_then(|rows| rows.get(&row_id))
            .cloned())
    }

    fn put(&mut self, table: &str, row_id: RowId, payload: Vec<u8>) -> EngineResult<()> {
        self.check_writable(table)?;
        self.staged
            .push(StagedOp::Put(table.to_string(), row_id, payload));
        Ok(())
    }

    fn delete(&mut self, table: &str, row_id: RowId) -> EngineResult<()> {
        self.check_writable(table)?;
        self.staged
            .push(StagedOp::Delete(table.to_string(), row_id));
        Ok(())
    }

    fn scan(&self, table: &str) -> EngineResult<Vec<(RowId, Vec<u8>)>> {
        self.check_scope(table)?;
        let inner = self
            .store
            .read()
            .map_err(|_| EngineError::BackStore("Store lock poisoned".into()))?;
        let mut rows: BTreeMap<RowId, Option<Vec<u8>>> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .map(|(id, payload)| (*id, Some(payload.clone())))
                    .collect()
            })
            .unwrap_or_default();
        drop(inner);
        for op in &self.staged {
            match op {
                StagedOp::Put(t, id, payload) if t == table => {
                    rows.insert(*id, Some(payload.clone()));
                }
                StagedOp::Delete(t, id) if t == table => {
                    rows.insert(*id, None);
                }
                _ => {}
            }
        }
        Ok(rows
            .into_iter()
            .filter_map(|(id, payload)| payload.map(|p| (id, p)))
            .collect())
    }

    fn max_key(&self, table: &str) -> EngineResult<Option<RowId>> {
        self.check_scope(table)?;
        let inner = self
            .store
            .read()
            .map_err(|_| EngineError::BackStore("Store lock poisoned".into()))?;
        Ok(inner
            .tables
            .get(table)
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    fn commit(self: Box<Self>) -> EngineResult<()> {
        let mut inner = self
            .store
            .write()
            .map_err(|_| EngineError::BackStore("Store lock poisoned".into()))?;
        if inner.closed {
            return Err(EngineError::BackStore("Store is closed".into()));
        }
        for op in self.staged {
            match op {
                StagedOp::Put(table, id, payload) => {
                    inner.tables.entry(table).or_default().insert(id, payload);
                }
                StagedOp::Delete(table, id) => {
                    if let Some(rows) = inner.tables.get_mut(&table) {
                        rows.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    fn abort(self: Box<Self>) {
        // Staged writes drop with the tx
    }
}
