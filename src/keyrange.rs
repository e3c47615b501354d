//! Key ranges
//!
//! Half-open or closed intervals over the value key order. Either endpoint
//! may be absent. A singleton is `from == to`, both inclusive. Ranges are
//! value types with structural equality; the planner translates predicates
//! into unions of ranges and indices estimate scan cost from them.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// An interval over the key domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    /// Lower endpoint, None for open
    pub from: Option<Value>,
    /// Upper endpoint, None for open
    pub to: Option<Value>,
    /// Whether the lower endpoint itself is excluded
    pub from_exclusive: bool,
    /// Whether the upper endpoint itself is excluded
    pub to_exclusive: bool,
}

impl KeyRange {
    /// Range covering all keys
    pub fn all() -> Self {
        Self {
            from: None,
            to: None,
            from_exclusive: false,
            to_exclusive: false,
        }
    }

    /// Singleton range containing exactly `key`
    pub fn only(key: Value) -> Self {
        Self {
            from: Some(key.clone()),
            to: Some(key),
            from_exclusive: false,
            to_exclusive: false,
        }
    }

    /// Range of keys at or above `key` (above only, when exclusive)
    pub fn lower_bound(key: Value, exclusive: bool) -> Self {
        Self {
            from: Some(key),
            to: None,
            from_exclusive: exclusive,
            to_exclusive: false,
        }
    }

    /// Range of keys at or below `key` (below only, when exclusive)
    pub fn upper_bound(key: Value, exclusive: bool) -> Self {
        Self {
            from: None,
            to: Some(key),
            from_exclusive: false,
            to_exclusive: exclusive,
        }
    }

    /// General constructor
    pub fn range(
        from: Option<Value>,
        to: Option<Value>,
        from_exclusive: bool,
        to_exclusive: bool,
    ) -> Self {
        Self {
            from,
            to,
            from_exclusive,
            to_exclusive,
        }
    }

    /// Returns true if both endpoints are open
    pub fn is_all(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Returns true if the range can hold no key
    pub fn is_empty(&self) -> bool {
        match (&self.from, &self.to) {
            (Some(f), Some(t)) => {
                f > t || (f == t && (self.from_exclusive || self.to_exclusive))
            }
            _ => false,
        }
    }

    /// Returns true if `key` falls inside the range, respecting exclusivity
    pub fn contains(&self, key: &Value) -> bool {
        if let Some(from) = &self.from {
            if key < from || (key == from && self.from_exclusive) {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if key > to || (key == to && self.to_exclusive) {
                return false;
            }
        }
        true
    }

    /// Swaps the bounds, for descending scans
    pub fn reverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
            from_exclusive: self.to_exclusive,
            to_exclusive: self.from_exclusive,
        }
    }

    /// Complement of this range as a set of keys.
    ///
    /// Yields zero ranges for `all()`, one for a half-bounded range, two for
    /// a bounded one.
    pub fn complement(&self) -> Vec<KeyRange> {
        let mut out = Vec::new();
        if let Some(from) = &self.from {
            out.push(KeyRange::upper_bound(from.clone(), !self.from_exclusive));
        }
        if let Some(to) = &self.to {
            out.push(KeyRange::lower_bound(to.clone(), !self.to_exclusive));
        }
        out
    }

    /// Complement of a sorted, disjoint union of ranges (the shape
    /// `complement` produces), yielding the gaps between them.
    pub fn complement_set(ranges: &[KeyRange]) -> Vec<KeyRange> {
        if ranges.is_empty() {
            return vec![KeyRange::all()];
        }
        let mut out = Vec::new();
        let first = &ranges[0];
        if let Some(from) = &first.from {
            out.push(KeyRange::upper_bound(from.clone(), !first.from_exclusive));
        }
        for pair in ranges.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if let (Some(to), Some(from)) = (&left.to, &right.from) {
                out.push(KeyRange::range(
                    Some(to.clone()),
                    Some(from.clone()),
                    !left.to_exclusive,
                    !right.from_exclusive,
                ));
            }
        }
        let last = &ranges[ranges.len() - 1];
        if let Some(to) = &last.to {
            out.push(KeyRange::lower_bound(to.clone(), !last.to_exclusive));
        }
        out
    }
}

impl std::fmt::Display for KeyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.from {
            Some(from) => write!(f, "{}{}", if self.from_exclusive { '(' } else { '[' }, from)?,
            None => write!(f, "(-inf")?,
        }
        write!(f, ", ")?;
        match &self.to {
            Some(to) => write!(f, "{}{}", to, if self.to_exclusive { ')' } else { ']' }),
            None => write!(f, "inf)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Value {
        Value::Integer(v)
    }

    #[test]
    fn test_only_contains_exactly_one_key() {
        let r = KeyRange::only(int(5));
        assert!(r.contains(&int(5)));
        assert!(!r.contains(&int(4)));
        assert!(!r.contains(&int(6)));
    }

    #[test]
    fn test_exclusivity_respected() {
        let r = KeyRange::range(Some(int(12)), Some(int(15)), false, true);
        assert!(r.contains(&int(12)));
        assert!(r.contains(&int(14)));
        assert!(!r.contains(&int(15)));

        let r = KeyRange::lower_bound(int(15), true);
        assert!(!r.contains(&int(15)));
        assert!(r.contains(&int(16)));
    }

    #[test]
    fn test_all_contains_everything() {
        let r = KeyRange::all();
        assert!(r.contains(&int(i64::MIN)));
        assert!(r.contains(&Value::Text("anything".into())));
    }

    #[test]
    fn test_reverse_swaps_bounds() {
        let r = KeyRange::range(Some(int(1)), Some(int(9)), true, false);
        let rev = r.reverse();
        assert_eq!(rev.from, Some(int(9)));
        assert_eq!(rev.to, Some(int(1)));
        assert!(!rev.from_exclusive);
        assert!(rev.to_exclusive);
        assert_eq!(rev.reverse(), r);
    }

    #[test]
    fn test_complement_of_all_is_empty() {
        assert!(KeyRange::all().complement().is_empty());
    }

    #[test]
    fn test_complement_of_singleton_is_two_ranges() {
        let parts = KeyRange::only(int(7)).complement();
        assert_eq!(parts.len(), 2);
        assert!(parts[0].contains(&int(6)));
        assert!(!parts[0].contains(&int(7)));
        assert!(parts[1].contains(&int(8)));
        assert!(!parts[1].contains(&int(7)));
    }

    #[test]
    fn test_complement_involution() {
        let cases = vec![
            KeyRange::only(int(7)),
            KeyRange::lower_bound(int(3), true),
            KeyRange::upper_bound(int(3), false),
            KeyRange::range(Some(int(2)), Some(int(9)), true, false),
            KeyRange::all(),
        ];
        for r in cases {
            let back = KeyRange::complement_set(&r.complement());
            assert_eq!(back, vec![r.clone()], "complement is an involution");
        }
    }

    #[test]
    fn test_empty_detection() {
        assert!(KeyRange::range(Some(int(5)), Some(int(3)), false, false).is_empty());
        assert!(KeyRange::range(Some(int(5)), Some(int(5)), true, false).is_empty());
        assert!(!KeyRange::only(int(5)).is_empty());
    }
}
