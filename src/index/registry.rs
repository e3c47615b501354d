//! Index registry
//!
//! Builds and owns every index a schema declares: one unique ordered index
//! per single-column primary key, one per declared unique column, and one
//! per secondary index declaration. Mutations flow through the registry so
//! a row is always present in every index that covers it.

use std::collections::HashMap;

use crate::errors::EngineResult;
use crate::row::Row;
use crate::schema::{DatabaseSchema, IndexOrder, TableSchema};
use crate::value::Value;

use super::{OrderedIndex, TableIndex};

/// One index together with the column it covers
pub struct IndexSlot {
    /// Covered column
    pub column: String,
    /// The index itself
    pub index: Box<dyn TableIndex>,
}

/// All indices of a database, grouped by table
#[derive(Default)]
pub struct IndexRegistry {
    by_table: HashMap<String, Vec<IndexSlot>>,
}

impl IndexRegistry {
    /// Build the registry a schema calls for
    pub fn from_schema(schema: &DatabaseSchema) -> Self {
        let mut by_table = HashMap::new();
        for table in &schema.tables {
            by_table.insert(table.name.clone(), Self::slots_for(table));
        }
        Self { by_table }
    }

    fn slots_for(table: &TableSchema) -> Vec<IndexSlot> {
        let mut slots: Vec<IndexSlot> = Vec::new();
        let covered = |slots: &[IndexSlot], column: &str| -> bool {
            slots.iter().any(|s| s.column == column)
        };

        // Declared secondary indices first, single-column only: composite
        // declarations fall back to the leading column
        for def in &table.indices {
            if let Some(column) = def.columns.first() {
                if !covered(&slots, column) {
                    slots.push(IndexSlot {
                        column: column.clone(),
                        index: Box::new(OrderedIndex::new(
                            def.name.clone(),
                            def.unique,
                            def.order,
                        )),
                    });
                }
            }
        }

        // Unique columns and a single-column primary key get a unique index
        for column in table.unique_columns() {
            if !covered(&slots, column) {
                slots.push(IndexSlot {
                    column: column.to_string(),
                    index: Box::new(OrderedIndex::new(
                        format!("{}_{}_unique", table.name, column),
                        true,
                        IndexOrder::Asc,
                    )),
                });
            }
        }

        slots
    }

    /// The index covering `column`, if any
    pub fn lookup(&self, table: &str, column: &str) -> Option<&dyn TableIndex> {
        self.by_table
            .get(table)?
            .iter()
            .find(|s| s.column == column)
            .map(|s| s.index.as_ref())
    }

    /// Every slot of a table
    pub fn slots(&self, table: &str) -> &[IndexSlot] {
        self.by_table.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Add a row to every covering index
    pub fn add_row(&mut self, table: &str, row: &Row) -> EngineResult<()> {
        if let Some(slots) = self.by_table.get_mut(table) {
            for slot in slots {
                slot.index.add(row.get(&slot.column), row.id)?;
            }
        }
        Ok(())
    }

    /// Remove a row from every covering index
    pub fn remove_row(&mut self, table: &str, row: &Row) {
        if let Some(slots) = self.by_table.get_mut(table) {
            for slot in slots {
                slot.index.remove(row.get(&slot.column), Some(row.id));
            }
        }
    }

    /// Move a row from its old image to its new one.
    ///
    /// A unique slot takes the new key via `set`: constraint validation has
    /// already run, so whatever held the key has been rewritten away and
    /// the key is replaced wholesale. Non-unique slots append in insertion
    /// order.
    pub fn update_row(&mut self, table: &str, old: &Row, new: &Row) -> EngineResult<()> {
        if let Some(slots) = self.by_table.get_mut(table) {
            for slot in slots {
                let old_key = old.get(&slot.column);
                let new_key = new.get(&slot.column);
                if old_key != new_key {
                    slot.index.remove(old_key, Some(old.id));
                    if slot.index.is_unique() {
                        slot.index.set(new_key, new.id);
                    } else {
                        slot.index.add(new_key, new.id)?;
                    }
                }
            }
        }
        Ok(())
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnType, IndexDef};
    use std::collections::HashMap as Map;

    fn schema() -> DatabaseSchema {
        DatabaseSchema::new(
            "db",
            1,
            vec![TableSchema::new(
                "user",
                vec![
                    Column::new("id", ColumnType::Integer),
                    Column::new("email", ColumnType::Text).unique(),
                    Column::new("age", ColumnType::Integer).nullable(),
                ],
            )
            .with_primary_key(vec!["id"])
            .with_index(IndexDef::on("idx_age", "age"))],
        )
    }

    fn row(id: u64, email: &str, age: i64) -> Row {
        let mut payload = Map::new();
        payload.insert("id".to_string(), Value::Integer(id as i64));
        payload.insert("email".to_string(), Value::Text(email.into()));
        payload.insert("age".to_string(), Value::Integer(age));
        Row::new(id, payload)
    }

    #[test]
    fn test_schema_driven_slots() {
        let registry = IndexRegistry::from_schema(&schema());
        assert!(registry.lookup("user", "id").is_some());
        assert!(registry.lookup("user", "email").is_some());
        assert!(registry.lookup("user", "age").is_some());
        assert!(registry.lookup("user", "name").is_none());

        assert!(registry.lookup("user", "email").unwrap().is_unique());
        assert!(!registry.lookup("user", "age").unwrap().is_unique());
    }

    #[test]
    fn test_add_remove_row() {
        let mut registry = IndexRegistry::from_schema(&schema());
        let r = row(1, "a@x", 30);
        registry.add_row("user", &r).unwrap();
        assert_eq!(
            registry
                .lookup("user", "email")
                .unwrap()
                .get(&Value::Text("a@x".into())),
            vec![1]
        );

        registry.remove_row("user", &r);
        assert!(registry
            .lookup("user", "email")
            .unwrap()
            .get(&Value::Text("a@x".into()))
            .is_empty());
    }

    #[test]
    fn test_update_moves_keys() {
        let mut registry = IndexRegistry::from_schema(&schema());
        let old = row(1, "a@x", 30);
        registry.add_row("user", &old).unwrap();

        let new = row(1, "b@x", 30);
        registry.update_row("user", &old, &new).unwrap();

        let email_index = registry.lookup("user", "email").unwrap();
        assert!(email_index.get(&Value::Text("a@x".into())).is_empty());
        assert_eq!(email_index.get(&Value::Text("b@x".into())), vec![1]);
        // Unchanged key untouched
        assert_eq!(
            registry.lookup("user", "age").unwrap().get(&Value::Integer(30)),
            vec![1]
        );
    }
}
