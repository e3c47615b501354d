//! Flat map index
//!
//! HashMap-backed index for point lookups. `get_range` degrades to a full
//! scan sorted by key so results stay deterministic; `min`/`max` are not
//! kept.

use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};
use crate::keyrange::KeyRange;
use crate::row::RowId;
use crate::value::Value;

use super::TableIndex;

/// HashMap-based index
#[derive(Debug)]
pub struct FlatIndex {
    name: String,
    unique: bool,
    map: HashMap<Value, Vec<RowId>>,
    total: usize,
}

impl FlatIndex {
    /// Create an empty flat index
    pub fn new(name: impl Into<String>, unique: bool) -> Self {
        Self {
            name: name.into(),
            unique,
            map: HashMap::new(),
            total: 0,
        }
    }
}

impl TableIndex for FlatIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_unique(&self) -> bool {
        self.unique
    }

    fn add(&mut self, key: &Value, row_id: RowId) -> EngineResult<()> {
        if !key.is_index_key() {
            return Ok(());
        }
        let ids = self.map.entry(key.clone()).or_default();
        if self.unique && !ids.is_empty() {
            return Err(EngineError::constraint(
                "index",
                &self.name,
                format!("Duplicate key {} in unique index", key),
            ));
        }
        ids.push(row_id);
        self.total += 1;
        Ok(())
    }

    fn set(&mut self, key: &Value, row_id: RowId) {
        if !key.is_index_key() {
            return;
        }
        let ids = self.map.entry(key.clone()).or_default();
        self.total -= ids.len();
        ids.clear();
        ids.push(row_id);
        self.total += 1;
    }

    fn remove(&mut self, key: &Value, row_id: Option<RowId>) {
        if let Some(ids) = self.map.get_mut(key) {
            match row_id {
                Some(id) => {
                    if let Some(pos) = ids.iter().position(|&x| x == id) {
                        ids.remove(pos);
                        self.total -= 1;
                    }
                }
                None => {
                    self.total -= ids.len();
                    ids.clear();
                }
            }
            if ids.is_empty() {
                self.map.remove(key);
            }
        }
    }

    fn get(&self, key: &Value) -> Vec<RowId> {
        self.map.get(key).cloned().unwrap_or_default()
    }

    fn get_range(&self, range: Option<&KeyRange>) -> Vec<RowId> {
        // Full scan; sort keys so the result order is deterministic
        let mut keys: Vec<&Value> = self
            .map
            .keys()
            .filter(|k| range.map_or(true, |r| r.contains(k)))
            .collect();
        keys.sort();
        let mut out = Vec::new();
        for key in keys {
            out.extend(&self.map[key]);
        }
        out
    }

    fn cost(&self, _range: Option<&KeyRange>) -> usize {
        // A flat map cannot narrow a range scan
        self.total
    }

    fn key_order(&self) -> Option<crate::schema::IndexOrder> {
        None
    }

    fn min_key(&self) -> Option<Value> {
        None
    }

    fn max_key(&self) -> Option<Value> {
        None
    }

    fn len(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Value {
        Value::Integer(v)
    }

    #[test]
    fn test_point_lookup() {
        let mut index = FlatIndex::new("f", false);
        index.add(&int(1), 10).unwrap();
        index.add(&int(1), 11).unwrap();
        assert_eq!(index.get(&int(1)), vec![10, 11]);
    }

    #[test]
    fn test_range_degrades_to_scan() {
        let mut index = FlatIndex::new("f", false);
        for i in 0..5 {
            index.add(&int(i), i as RowId).unwrap();
        }
        let range = KeyRange::range(Some(int(1)), Some(int(3)), false, false);
        assert_eq!(index.get_range(Some(&range)), vec![1, 2, 3]);
        // Cost cannot narrow
        assert_eq!(index.cost(Some(&range)), 5);
    }

    #[test]
    fn test_unique_constraint() {
        let mut index = FlatIndex::new("f", true);
        index.add(&int(1), 10).unwrap();
        assert!(index.add(&int(1), 11).is_err());
    }

    #[test]
    fn test_no_extremal_keys() {
        let mut index = FlatIndex::new("f", false);
        index.add(&int(1), 10).unwrap();
        assert_eq!(index.min_key(), None);
        assert_eq!(index.max_key(), None);
    }
}
