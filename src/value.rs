//! Column value domain
//!
//! Values carry a total key order for index use:
//! Boolean < Integer < Real < Text < DateTime < Binary < Null.
//! Reals are ordered by sign-corrected bit patterns so the order is total.
//! There is no cross-type coercion: integer 1 never equals text "1".
//! Null sorts last and is not a valid index key.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A single column value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum Value {
    /// Boolean (false < true)
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Real(f64),
    /// UTF-8 text, compared by code-unit order
    Text(String),
    /// Datetime as milliseconds since the Unix epoch
    DateTime(i64),
    /// Opaque binary payload
    Binary(Vec<u8>),
    /// Absent value
    Null,
}

impl Value {
    /// Create a datetime value from a chrono timestamp
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt.timestamp_millis())
    }

    /// Interpret this value as a chrono timestamp
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(ms) => Utc.timestamp_millis_opt(*ms).single(),
            _ => None,
        }
    }

    /// Returns the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::DateTime(_) => "datetime",
            Value::Binary(_) => "binary",
            Value::Null => "null",
        }
    }

    /// Returns true if this is the null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null is not a valid index key
    pub fn is_index_key(&self) -> bool {
        !self.is_null()
    }

    /// Type rank used as the primary sort criterion
    fn rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) => 1,
            Value::Real(_) => 2,
            Value::Text(_) => 3,
            Value::DateTime(_) => 4,
            Value::Binary(_) => 5,
            Value::Null => 6,
        }
    }

    /// Sign-corrected bit pattern giving f64 a total order
    fn real_order_bits(v: f64) -> u64 {
        let bits = v.to_bits();
        if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        }
    }

    /// Convert from a JSON value, used by fixtures and the persisted form
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Value::Boolean(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Integer(i))
                } else {
                    n.as_f64().map(Value::Real)
                }
            }
            serde_json::Value::String(s) => Some(Value::Text(s.clone())),
            serde_json::Value::Null => Some(Value::Null),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            (Value::Null, Value::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Real(r) => r.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::DateTime(ms) => ms.hash(state),
            Value::Binary(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => {
                Self::real_order_bits(*a).cmp(&Self::real_order_bits(*b))
            }
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::DateTime(ms) => write!(f, "datetime({})", ms),
            Value::Binary(b) => write!(f, "binary[{}]", b.len()),
            Value::Null => write!(f, "null"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_rank_ordering() {
        let values = vec![
            Value::Boolean(false),
            Value::Boolean(true),
            Value::Integer(-100),
            Value::Integer(100),
            Value::Real(-1.5),
            Value::Real(2.5),
            Value::Text("aaa".into()),
            Value::Text("zzz".into()),
            Value::DateTime(0),
            Value::Null,
        ];

        for i in 1..values.len() {
            assert!(values[i - 1] < values[i], "values must be totally ordered");
        }
    }

    #[test]
    fn test_real_total_order() {
        assert!(Value::Real(-2.0) < Value::Real(-1.0));
        assert!(Value::Real(-1.0) < Value::Real(0.0));
        assert!(Value::Real(0.0) < Value::Real(1.5));
        assert_eq!(Value::Real(1.5), Value::Real(1.5));
    }

    #[test]
    fn test_no_cross_type_equality() {
        assert_ne!(Value::Integer(1), Value::Text("1".into()));
        assert_ne!(Value::Integer(1), Value::Real(1.0));
        assert_ne!(Value::Boolean(true), Value::Integer(1));
    }

    #[test]
    fn test_null_is_not_an_index_key() {
        assert!(!Value::Null.is_index_key());
        assert!(Value::Integer(0).is_index_key());
    }

    #[test]
    fn test_datetime_round_trip() {
        let dt = Utc.timestamp_millis_opt(1_500_000_000_000).single().unwrap();
        let v = Value::from_datetime(dt);
        assert_eq!(v.as_datetime(), Some(dt));
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            Value::from_json(&serde_json::json!(42)),
            Some(Value::Integer(42))
        );
        assert_eq!(
            Value::from_json(&serde_json::json!("hi")),
            Some(Value::Text("hi".into()))
        );
        assert_eq!(Value::from_json(&serde_json::json!([1])), None);
    }
}
