//! Transaction journal
//!
//! Per-transaction staging area. Every write lands here first, keyed by
//! (table, row-id) as before/after images. Reads during the transaction see
//! the journal's post-image before cache or store. On commit the journal is
//! flushed to the store transaction, then replayed into indices and cache;
//! on abort it is simply dropped.

use std::collections::BTreeMap;

use crate::backstore::StoreTx;
use crate::cache::RowCache;
use crate::errors::{EngineError, EngineResult};
use crate::index::IndexRegistry;
use crate::row::{Row, RowId};
use crate::schema::DatabaseSchema;
use crate::value::Value;

/// Before/after image of one row
#[derive(Debug, Clone)]
pub struct RowChange {
    /// Image before the transaction, None for a fresh insert
    pub before: Option<Row>,
    /// Image after the transaction, None for a delete
    pub after: Option<Row>,
}

/// What the journal knows about a row
pub enum Visibility<'a> {
    /// The journal holds no change for the row
    Unchanged,
    /// The row exists with this post-image
    Present(&'a Row),
    /// The row is deleted in this transaction
    Deleted,
}

/// Staged mutations of one transaction
#[derive(Debug, Default)]
pub struct Journal {
    changes: BTreeMap<String, BTreeMap<RowId, RowChange>>,
}

impl Journal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert of a fresh row
    pub fn insert(&mut self, table: &str, row: Row) {
        self.changes
            .entry(table.to_string())
            .or_default()
            .insert(row.id, RowChange {
                before: None,
                after: Some(row),
            });
    }

    /// Stage an update; `before` is the image visible when the transaction
    /// first touched the row
    pub fn update(&mut self, table: &str, before: Row, after: Row) {
        let entry = self
            .changes
            .entry(table.to_string())
            .or_default()
            .entry(after.id)
            .or_insert(RowChange {
                before: Some(before),
                after: None,
            });
        entry.after = Some(after);
    }

    /// Stage a delete
    pub fn delete(&mut self, table: &str, before: Row) {
        let id = before.id;
        let table_changes = self.changes.entry(table.to_string()).or_default();
        let fresh_insert = matches!(table_changes.get(&id), Some(c) if c.before.is_none());
        if fresh_insert {
            // Insert followed by delete inside one tx cancels out
            table_changes.remove(&id);
        } else if let Some(change) = table_changes.get_mut(&id) {
            change.after = None;
        } else {
            table_changes.insert(
                id,
                RowChange {
                    before: Some(before),
                    after: None,
                },
            );
        }
    }

    /// The journal's view of one row
    pub fn visibility(&self, table: &str, row_id: RowId) -> Visibility<'_> {
        match self.changes.get(table).and_then(|t| t.get(&row_id)) {
            None => Visibility::Unchanged,
            Some(RowChange { after: Some(row), .. }) => Visibility::Present(row),
            Some(RowChange { after: None, .. }) => Visibility::Deleted,
        }
    }

    /// Tables with at least one staged change
    pub fn touched_tables(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(table, _)| table.clone())
            .collect()
    }

    /// Row-ids inserted by this journal for a table
    pub fn inserted_ids(&self, table: &str) -> Vec<RowId> {
        self.changes
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, c)| c.before.is_none() && c.after.is_some())
                    .map(|(id, _)| *id)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns true when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(|rows| rows.is_empty())
    }

    /// Changes of one table in row-id order
    pub fn table_changes(&self, table: &str) -> Vec<(&RowId, &RowChange)> {
        self.changes
            .get(table)
            .map(|rows| rows.iter().collect())
            .unwrap_or_default()
    }

    /// Validate the post-image against schema constraints.
    ///
    /// Checks column types, not-null columns, and unique columns. Uniqueness
    /// is checked within the journal and against rows still visible in the
    /// cache (rows the journal rewrote or deleted no longer count).
    pub fn validate(
        &self,
        schema: &DatabaseSchema,
        cache: &RowCache,
        registry: &IndexRegistry,
    ) -> EngineResult<()> {
        for (table_name, rows) in &self.changes {
            let table = schema
                .table(table_name)
                .ok_or_else(|| EngineError::TableNotFound(table_name.clone()))?;

            let not_null = table.not_null_columns();
            let unique = table.unique_columns();

            for change in rows.values() {
                let after = match &change.after {
                    Some(row) => row,
                    None => continue,
                };

                // Declared types
                for column in &table.columns {
                    let value = after.get(&column.name);
                    if !column.column_type.admits(value) {
                        return Err(EngineError::constraint(
                            table_name.as_str(),
                            column.name.as_str(),
                            format!(
                                "Expected {}, got {}",
                                column.column_type.type_name(),
                                value.type_name()
                            ),
                        ));
                    }
                }

                // Not-null
                for column in &not_null {
                    if after.get(column).is_null() {
                        return Err(EngineError::constraint(
                            table_name.as_str(),
                            *column,
                            "Column is not nullable",
                        ));
                    }
                }

                // Unique, against the visible remainder of the table
                for column in &unique {
                    let key = after.get(column);
                    if key.is_null() {
                        continue;
                    }
                    if self.key_conflicts(table_name, column, key, after.id, cache, registry) {
                        return Err(EngineError::constraint(
                            table_name.as_str(),
                            *column,
                            format!("Duplicate value {}", key),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    fn key_conflicts(
        &self,
        table: &str,
        column: &str,
        key: &Value,
        row_id: RowId,
        cache: &RowCache,
        registry: &IndexRegistry,
    ) -> bool {
        // Other post-images in this journal
        if let Some(rows) = self.changes.get(table) {
            for (other_id, change) in rows {
                if *other_id == row_id {
                    continue;
                }
                if let Some(after) = &change.after {
                    if after.get(column) == key {
                        return true;
                    }
                }
            }
        }

        // Committed rows still visible through this journal
        let candidates = match registry.lookup(table, column) {
            Some(index) => index.get(key),
            None => cache.row_ids(table),
        };
        for candidate in candidates {
            if candidate == row_id {
                continue;
            }
            // A row the journal rewrote or deleted no longer counts
            if let Some(change) = self.changes.get(table).and_then(|t| t.get(&candidate)) {
                match &change.after {
                    Some(after) if after.get(column) == key => return true,
                    _ => continue,
                }
            }
            if let Some(row) = cache.peek(table, candidate) {
                if row.get(column) == key {
                    return true;
                }
            }
        }
        false
    }

    /// Write every staged change into the store transaction
    pub fn flush(&self, tx: &mut dyn StoreTx) -> EngineResult<()> {
        for (table, rows) in &self.changes {
            for (row_id, change) in rows {
                match &change.after {
                    Some(row) => {
                        let payload = serde_json::to_vec(row).map_err(|e| {
                            EngineError::BackStore(format!("Row serialisation failed: {}", e))
                        })?;
                        tx.put(table, *row_id, payload)?;
                    }
                    None => tx.delete(table, *row_id)?,
                }
            }
        }
        Ok(())
    }

    /// Promote the post-image into indices and cache. Runs after a
    /// successful store commit; validation has already passed.
    pub fn apply(self, cache: &mut RowCache, registry: &mut IndexRegistry) -> EngineResult<()> {
        for (table, rows) in self.changes {
            for (row_id, change) in rows {
                match (change.before, change.after) {
                    (None, Some(after)) => {
                        registry.add_row(&table, &after)?;
                        cache.put(&table, after);
                    }
                    (Some(before), Some(after)) => {
                        registry.update_row(&table, &before, &after)?;
                        cache.put(&table, after);
                    }
                    (Some(before), None) => {
                        registry.remove_row(&table, &before);
                        cache.remove(&table, row_id);
                    }
                    (None, None) => {}
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, TableSchema};
    use std::collections::HashMap;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            "db",
            1,
            vec![TableSchema::new(
                "user",
                vec![
                    Column::new("id", ColumnType::Integer),
                    Column::new("email", ColumnType::Text).unique(),
                ],
            )
            .with_primary_key(vec!["id"])],
        )
    }

    fn row(id: RowId, email: &str) -> Row {
        let mut payload = HashMap::new();
        payload.insert("id".to_string(), Value::Integer(id as i64));
        payload.insert("email".to_string(), Value::Text(email.into()));
        Row::new(id, payload)
    }

    #[test]
    fn test_reads_see_post_image() {
        let mut journal = Journal::new();
        journal.insert("user", row(1, "a@x"));

        match journal.visibility("user", 1) {
            Visibility::Present(r) => assert_eq!(r.get("email"), &Value::Text("a@x".into())),
            _ => panic!("expected post-image"),
        }
        assert!(matches!(
            journal.visibility("user", 2),
            Visibility::Unchanged
        ));
    }

    #[test]
    fn test_insert_then_delete_cancels() {
        let mut journal = Journal::new();
        let r = row(1, "a@x");
        journal.insert("user", r.clone());
        journal.delete("user", r);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_duplicate_inside_journal_rejected() {
        let schema = schema();
        let cache = RowCache::new();
        let registry = IndexRegistry::from_schema(&schema);

        let mut journal = Journal::new();
        journal.insert("user", row(1, "x@y"));
        journal.insert("user", row(2, "x@y"));

        let err = journal.validate(&schema, &cache, &registry).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::ConstraintViolation);
    }

    #[test]
    fn test_duplicate_against_cache_rejected() {
        let schema = schema();
        let mut cache = RowCache::new();
        let mut registry = IndexRegistry::from_schema(&schema);

        let committed = row(1, "x@y");
        registry.add_row("user", &committed).unwrap();
        cache.put("user", committed);

        let mut journal = Journal::new();
        journal.insert("user", row(2, "x@y"));

        assert!(journal.validate(&schema, &cache, &registry).is_err());
    }

    #[test]
    fn test_rewritten_row_frees_its_key() {
        let schema = schema();
        let mut cache = RowCache::new();
        let mut registry = IndexRegistry::from_schema(&schema);

        let committed = row(1, "x@y");
        registry.add_row("user", &committed).unwrap();
        cache.put("user", committed.clone());

        // Move row 1 to a new email, then reuse the old one for row 2
        let mut journal = Journal::new();
        journal.update("user", committed, row(1, "z@y"));
        journal.insert("user", row(2, "x@y"));

        assert!(journal.validate(&schema, &cache, &registry).is_ok());
    }

    #[test]
    fn test_not_null_enforced() {
        let schema = schema();
        let cache = RowCache::new();
        let registry = IndexRegistry::from_schema(&schema);

        let mut bad = row(1, "a@x");
        bad.set("email", Value::Null);

        let mut journal = Journal::new();
        journal.insert("user", bad);

        let err = journal.validate(&schema, &cache, &registry).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::ConstraintViolation);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let schema = schema();
        let cache = RowCache::new();
        let registry = IndexRegistry::from_schema(&schema);

        let mut bad = row(1, "a@x");
        bad.set("email", Value::Integer(42));

        let mut journal = Journal::new();
        journal.insert("user", bad);

        assert!(journal.validate(&schema, &cache, &registry).is_err());
    }

    #[test]
    fn test_apply_promotes_into_cache_and_indices() {
        let schema = schema();
        let mut cache = RowCache::new();
        let mut registry = IndexRegistry::from_schema(&schema);

        let mut journal = Journal::new();
        journal.insert("user", row(1, "a@x"));
        journal.apply(&mut cache, &mut registry).unwrap();

        assert!(cache.peek("user", 1).is_some());
        assert_eq!(
            registry
                .lookup("user", "email")
                .unwrap()
                .get(&Value::Text("a@x".into())),
            vec![1]
        );
    }
}
