//! Ordered index
//!
//! BTreeMap-backed index giving deterministic key order. Row-ids within one
//! key keep insertion order. Descending indices reverse key iteration, not
//! storage.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::errors::{EngineError, EngineResult};
use crate::keyrange::KeyRange;
use crate::row::RowId;
use crate::schema::IndexOrder;
use crate::value::Value;

use super::TableIndex;

/// BTreeMap-based ordered index
#[derive(Debug)]
pub struct OrderedIndex {
    name: String,
    unique: bool,
    order: IndexOrder,
    tree: BTreeMap<Value, Vec<RowId>>,
    total: usize,
}

impl OrderedIndex {
    /// Create an empty ordered index
    pub fn new(name: impl Into<String>, unique: bool, order: IndexOrder) -> Self {
        Self {
            name: name.into(),
            unique,
            order,
            tree: BTreeMap::new(),
            total: 0,
        }
    }

    fn bounds(range: &KeyRange) -> (Bound<&Value>, Bound<&Value>) {
        let lower = match (&range.from, range.from_exclusive) {
            (Some(k), false) => Bound::Included(k),
            (Some(k), true) => Bound::Excluded(k),
            (None, _) => Bound::Unbounded,
        };
        let upper = match (&range.to, range.to_exclusive) {
            (Some(k), false) => Bound::Included(k),
            (Some(k), true) => Bound::Excluded(k),
            (None, _) => Bound::Unbounded,
        };
        (lower, upper)
    }

    fn collect_range(&self, range: Option<&KeyRange>) -> Vec<RowId> {
        let full = KeyRange::all();
        let range = range.unwrap_or(&full);
        if range.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        let iter = self.tree.range::<Value, _>(Self::bounds(range));
        match self.order {
            IndexOrder::Asc => {
                for (_, ids) in iter {
                    out.extend(ids);
                }
            }
            IndexOrder::Desc => {
                for (_, ids) in iter.rev() {
                    out.extend(ids);
                }
            }
        }
        out
    }
}

impl TableIndex for OrderedIndex {
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
        let ids = self.tree.entry(key.clone()).or_default();
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
        let ids = self.tree.entry(key.clone()).or_default();
        self.total -= ids.len();
        ids.clear();
        ids.push(row_id);
        self.total += 1;
    }

    fn remove(&mut self, key: &Value, row_id: Option<RowId>) {
        if let Some(ids) = self.tree.get_mut(key) {
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
                self.tree.remove(key);
            }
        }
    }

    fn get(&self, key: &Value) -> Vec<RowId> {
        self.tree.get(key).cloned().unwrap_or_default()
    }

    fn get_range(&self, range: Option<&KeyRange>) -> Vec<RowId> {
        self.collect_range(range)
    }

    fn cost(&self, range: Option<&KeyRange>) -> usize {
        match range {
            None => self.total,
            Some(r) if r.is_all() => self.total,
            Some(r) => {
                if r.is_empty() {
                    return 0;
                }
                self.tree
                    .range::<Value, _>(Self::bounds(r))
                    .map(|(_, ids)| ids.len())
                    .sum()
            }
        }
    }

    fn key_order(&self) -> Option<IndexOrder> {
        Some(self.order)
    }

    fn min_key(&self) -> Option<Value> {
        self.tree.keys().next().cloned()
    }

    fn max_key(&self) -> Option<Value> {
        self.tree.keys().next_back().cloned()
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

    fn seeded() -> OrderedIndex {
        // Keys 10..19 mapping to row-ids 20..29
        let mut index = OrderedIndex::new("idx", false, IndexOrder::Asc);
        for i in 0..10 {
            index.add(&int(10 + i), (20 + i) as RowId).unwrap();
        }
        index
    }

    #[test]
    fn test_get_single_key() {
        let index = seeded();
        assert_eq!(index.get(&int(15)), vec![25]);
    }

    #[test]
    fn test_get_range_exclusive_lower() {
        let index = seeded();
        let range = KeyRange::lower_bound(int(15), true);
        assert_eq!(index.get_range(Some(&range)), vec![26, 27, 28, 29]);
    }

    #[test]
    fn test_get_range_half_open() {
        let index = seeded();
        let range = KeyRange::range(Some(int(12)), Some(int(15)), false, true);
        assert_eq!(index.get_range(Some(&range)), vec![22, 23, 24]);
    }

    #[test]
    fn test_remove_specific_row() {
        let mut index = seeded();
        index.remove(&int(12), Some(22));
        assert_eq!(index.get(&int(12)), Vec::<RowId>::new());
    }

    #[test]
    fn test_set_replaces() {
        let mut index = seeded();
        index.set(&int(15), 35);
        assert_eq!(index.get(&int(15)), vec![35]);
        assert_eq!(index.len(), 10);
    }

    #[test]
    fn test_full_range_is_everything() {
        let index = seeded();
        assert_eq!(index.get_range(None).len(), 10);
        assert_eq!(
            index.get_range(None),
            index.get_range(Some(&KeyRange::all()))
        );
    }

    #[test]
    fn test_unique_rejects_duplicate() {
        let mut index = OrderedIndex::new("u", true, IndexOrder::Asc);
        index.add(&int(1), 100).unwrap();
        let err = index.add(&int(1), 200).unwrap_err();
        assert_eq!(err.code(), crate::errors::ErrorCode::ConstraintViolation);
    }

    #[test]
    fn test_insertion_order_within_key() {
        let mut index = OrderedIndex::new("i", false, IndexOrder::Asc);
        index.add(&int(7), 300).unwrap();
        index.add(&int(7), 100).unwrap();
        index.add(&int(7), 200).unwrap();
        assert_eq!(index.get(&int(7)), vec![300, 100, 200]);
    }

    #[test]
    fn test_null_key_skipped() {
        let mut index = OrderedIndex::new("i", false, IndexOrder::Asc);
        index.add(&Value::Null, 1).unwrap();
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_min_max() {
        let index = seeded();
        assert_eq!(index.min_key(), Some(int(10)));
        assert_eq!(index.max_key(), Some(int(19)));
    }

    #[test]
    fn test_descending_order() {
        let mut index = OrderedIndex::new("d", false, IndexOrder::Desc);
        for i in 1..=3 {
            index.add(&int(i), i as RowId).unwrap();
        }
        assert_eq!(index.get_range(None), vec![3, 2, 1]);
        assert_eq!(index.min_key(), Some(int(1)));
        assert_eq!(index.max_key(), Some(int(3)));
    }

    #[test]
    fn test_cost_monotone_and_bounded() {
        let index = seeded();
        let narrow = KeyRange::range(Some(int(12)), Some(int(14)), false, false);
        let wide = KeyRange::range(Some(int(10)), Some(int(18)), false, false);
        assert!(index.cost(Some(&narrow)) <= index.cost(Some(&wide)));
        assert!(index.cost(Some(&wide)) <= index.cost(None));
        assert_eq!(index.cost(None), 10);
    }

    #[test]
    fn test_no_numeric_string_mixing() {
        let mut index = OrderedIndex::new("m", false, IndexOrder::Asc);
        index.add(&int(1), 1).unwrap();
        index.add(&Value::Text("1".into()), 2).unwrap();
        assert_eq!(index.get(&int(1)), vec![1]);
        assert_eq!(index.get(&Value::Text("1".into())), vec![2]);
    }
}
