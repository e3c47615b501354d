//! Result sorting
//!
//! Stable sort over work rows. Values compare by the total key order, so
//! nulls group last under ascending order and mixed types never interleave.

use std::cmp::Ordering;

use crate::context::{Direction, OrderBySpec};
use crate::predicate::Tuple;

use super::result::WorkRow;

/// Sorts work rows
pub struct Sorter;

impl Sorter {
    /// Sort rows in place by the given specs, first spec outermost.
    /// The sort is stable: equal keys keep their incoming order.
    pub fn sort(rows: &mut [WorkRow], specs: &[OrderBySpec]) {
        rows.sort_by(|a, b| {
            for spec in specs {
                let av = a.value_of(&spec.column);
                let bv = b.value_of(&spec.column);
                let ordering = match spec.direction {
                    Direction::Asc => av.cmp(bv),
                    Direction::Desc => av.cmp(bv).reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::ColumnRef;
    use crate::row::Row;
    use crate::value::Value;
    use std::collections::HashMap;

    fn work(id: u64, year: i64, title: &str) -> WorkRow {
        let mut payload = HashMap::new();
        payload.insert("year".to_string(), Value::Integer(year));
        payload.insert("title".to_string(), Value::Text(title.into()));
        WorkRow::single("movie", Row::new(id, payload))
    }

    fn spec(column: &str, direction: Direction) -> OrderBySpec {
        OrderBySpec {
            column: ColumnRef::new("movie", column),
            direction,
        }
    }

    #[test]
    fn test_ascending() {
        let mut rows = vec![work(1, 1999, "c"), work(2, 1985, "a"), work(3, 1992, "b")];
        Sorter::sort(&mut rows, &[spec("year", Direction::Asc)]);
        let years: Vec<i64> = rows
            .iter()
            .map(|r| match r.value_of(&ColumnRef::new("movie", "year")) {
                Value::Integer(y) => *y,
                _ => panic!("expected integer"),
            })
            .collect();
        assert_eq!(years, vec![1985, 1992, 1999]);
    }

    #[test]
    fn test_descending() {
        let mut rows = vec![work(1, 1985, "a"), work(2, 1999, "c")];
        Sorter::sort(&mut rows, &[spec("year", Direction::Desc)]);
        assert_eq!(
            rows[0].value_of(&ColumnRef::new("movie", "year")),
            &Value::Integer(1999)
        );
    }

    #[test]
    fn test_secondary_key() {
        let mut rows = vec![work(1, 1999, "b"), work(2, 1999, "a"), work(3, 1985, "z")];
        Sorter::sort(
            &mut rows,
            &[spec("year", Direction::Asc), spec("title", Direction::Asc)],
        );
        assert_eq!(
            rows[1].value_of(&ColumnRef::new("movie", "title")),
            &Value::Text("a".into())
        );
    }

    #[test]
    fn test_stable_on_ties() {
        let mut rows = vec![work(1, 1999, "x"), work(2, 1999, "x"), work(3, 1999, "x")];
        Sorter::sort(&mut rows, &[spec("year", Direction::Asc)]);
        let ids: Vec<u64> = rows
            .iter()
            .map(|r| r.part("movie").unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
