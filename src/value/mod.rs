//! # Value and DataType
//!
//! The tagged value domain every table cell, literal, and comparison result
//! is made of. `Value` owns its variable-length payload outright (`String`,
//! `Vec<f32>`) rather than sharing it behind an `Rc`/`Arc`; cloning a `Value`
//! therefore always deep-copies the payload, which is exactly the behavior
//! row materialization during aggregation and joins needs to stay safe once
//! a source table is dropped.
//!
//! ```
//! use grizzly::value::{Value, DataType};
//!
//! let a = Value::Int32(3);
//! let b = Value::Float64(3.0);
//! assert_eq!(a.partial_cmp(&b), Some(std::cmp::Ordering::Equal));
//! assert_eq!(a.data_type(), DataType::Int32);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Static counterpart of [`Value`]; appears in schemas and cast rules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int32,
    Int64,
    Float32,
    Float64,
    Boolean,
    String,
    Timestamp,
    /// `dim` is `None` until the first value observed fixes it.
    Vector(Option<usize>),
    Custom(String),
    Exception,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "int32"),
            DataType::Int64 => write!(f, "int64"),
            DataType::Float32 => write!(f, "float32"),
            DataType::Float64 => write!(f, "float64"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::String => write!(f, "string"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Vector(Some(d)) => write!(f, "vector<{d}>"),
            DataType::Vector(None) => write!(f, "vector<?>"),
            DataType::Custom(name) => write!(f, "custom({name})"),
            DataType::Exception => write!(f, "exception"),
        }
    }
}

/// A tagged sum over the value domain Grizzly tables and expressions operate
/// on. Equality is structural; ordering is total within a type and coerces
/// int/float cross-type comparisons to `f64`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Boolean(bool),
    String(String),
    /// Milliseconds since the Unix epoch, UTC.
    Timestamp(i64),
    Vector(Vec<f32>),
    Custom(String, String),
    Exception(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::Float32(_) => DataType::Float32,
            Value::Float64(_) => DataType::Float64,
            Value::Boolean(_) => DataType::Boolean,
            Value::String(_) => DataType::String,
            Value::Timestamp(_) => DataType::Timestamp,
            Value::Vector(v) => DataType::Vector(Some(v.len())),
            Value::Custom(name, _) => DataType::Custom(name.clone()),
            Value::Exception(_) => DataType::Exception,
        }
    }

    /// The "zero" sentinel used to pad unmatched outer-join rows. Grizzly has
    /// no NULL `Value` variant (see the design note on three-valued logic in
    /// `expr::is_null`), so outer joins pad with each column's type-zero.
    pub fn zero_for(dt: &DataType) -> Value {
        match dt {
            DataType::Int32 => Value::Int32(0),
            DataType::Int64 => Value::Int64(0),
            DataType::Float32 => Value::Float32(0.0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::Boolean => Value::Boolean(false),
            DataType::String => Value::String(String::new()),
            DataType::Timestamp => Value::Timestamp(0),
            DataType::Vector(dim) => Value::Vector(vec![0.0; dim.unwrap_or(0)]),
            DataType::Custom(name) => Value::Custom(name.clone(), String::new()),
            DataType::Exception => Value::Exception(String::new()),
        }
    }

    /// Widen to `f64` for numeric comparison/arithmetic; `None` for
    /// non-numeric variants.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(f64::from(*v)),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Widens/narrows a literal to a column's declared type at `INSERT`
    /// time (parsed numeric literals are always `Int64`/`Float64`). Falls
    /// back to returning `self` unchanged when no numeric coercion applies,
    /// leaving the mismatch for the caller to reject.
    pub fn coerce_to(self, dt: &DataType) -> Value {
        match (self, dt) {
            (Value::Int64(v), DataType::Int32) => Value::Int32(v as i32),
            (Value::Int64(v), DataType::Float32) => Value::Float32(v as f32),
            (Value::Int64(v), DataType::Float64) => Value::Float64(v as f64),
            (Value::Int64(v), DataType::Timestamp) => Value::Timestamp(v),
            (Value::Float64(v), DataType::Float32) => Value::Float32(v as f32),
            (Value::Float64(v), DataType::Int32) => Value::Int32(v as i32),
            (Value::Float64(v), DataType::Int64) => Value::Int64(v as i64),
            (other, _) => other,
        }
    }

    /// Stable `{any}`-style textual rendering, used as the group-by key and
    /// for Mermaid/EXPLAIN labels. Not meant to be parsed back.
    pub fn format_key(&self) -> String {
        match self {
            Value::Int32(v) => format!("i32:{v}"),
            Value::Int64(v) => format!("i64:{v}"),
            Value::Float32(v) => format!("f32:{v}"),
            Value::Float64(v) => format!("f64:{v}"),
            Value::Boolean(v) => format!("bool:{v}"),
            Value::String(v) => format!("str:{v}"),
            Value::Timestamp(v) => format!("ts:{v}"),
            Value::Vector(v) => format!("vec:{v:?}"),
            Value::Custom(name, payload) => format!("custom:{name}:{payload}"),
            Value::Exception(msg) => format!("exc:{msg}"),
        }
    }

    /// Hash used as the bucket key for hash joins and composite-hash
    /// indexes. Numeric variants hash their `f64` widening so that `1` and
    /// `1.0` land in the same bucket, matching `PartialEq`'s cross-type
    /// coercion.
    pub fn hash_key(&self) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Some(f) = self.as_f64() {
            // Canonicalize -0.0 to 0.0 so that hash is consistent with Eq.
            let canon = if f == 0.0 { 0.0 } else { f };
            canon.to_bits().hash(state);
            return;
        }
        match self {
            Value::Boolean(b) => {
                1u8.hash(&mut *state);
                b.hash(state);
            }
            Value::String(s) => {
                2u8.hash(&mut *state);
                s.hash(state);
            }
            Value::Timestamp(t) => {
                3u8.hash(&mut *state);
                t.hash(state);
            }
            Value::Vector(v) => {
                4u8.hash(&mut *state);
                for f in v {
                    f.to_bits().hash(state);
                }
            }
            Value::Custom(name, payload) => {
                5u8.hash(&mut *state);
                name.hash(state);
                payload.hash(state);
            }
            Value::Exception(msg) => {
                6u8.hash(&mut *state);
                msg.hash(state);
            }
            Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_) => {
                unreachable!("numeric variants handled by as_f64 above")
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

/// `Value` has no NaN-bearing variant that participates in equality as
/// anything but "not equal to itself is irrelevant here" — Grizzly treats
/// float equality bitwise-canonically via `Hash`, so `Eq` is sound.
impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.partial_cmp(b),
            (Value::Vector(a), Value::Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.partial_cmp(y) {
                        Some(Ordering::Equal) => continue,
                        other => return other,
                    }
                }
                a.len().partial_cmp(&b.len())
            }
            (Value::Custom(n1, p1), Value::Custom(n2, p2)) => {
                (n1, p1).partial_cmp(&(n2, p2))
            }
            (Value::Exception(a), Value::Exception(b)) => a.partial_cmp(b),
            _ => {
                // Cross-type numeric coercion: int <-> float compares as f64.
                match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                }
            }
        }
    }
}

impl Ord for Value {
    /// A total order over the whole domain, required for B+Tree keys.
    /// Same-type and numeric cross-type comparisons use `PartialOrd`;
    /// otherwise values are ordered by their type's discriminant so the
    /// order is total (if not semantically meaningful across types).
    fn cmp(&self, other: &Self) -> Ordering {
        self.partial_cmp(other)
            .unwrap_or_else(|| discriminant(self).cmp(&discriminant(other)))
    }
}

fn discriminant(v: &Value) -> u8 {
    match v {
        Value::Int32(_) | Value::Int64(_) | Value::Float32(_) | Value::Float64(_) => 0,
        Value::Boolean(_) => 1,
        Value::String(_) => 2,
        Value::Timestamp(_) => 3,
        Value::Vector(_) => 4,
        Value::Custom(_, _) => 5,
        Value::Exception(_) => 6,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
            Value::Vector(v) => write!(f, "{v:?}"),
            Value::Custom(name, payload) => write!(f, "{name}({payload})"),
            Value::Exception(msg) => write!(f, "<exception: {msg}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_type_numeric_equality() {
        assert_eq!(Value::Int32(3), Value::Float64(3.0));
        assert_eq!(Value::Int64(-1), Value::Float32(-1.0));
    }

    #[test]
    fn string_ordering_is_lexicographic() {
        assert!(Value::String("Al".into()) < Value::String("Alice".into()));
    }

    #[test]
    fn vector_ordering_is_elementwise() {
        let a = Value::Vector(vec![1.0, 2.0]);
        let b = Value::Vector(vec![1.0, 3.0]);
        assert!(a < b);
    }

    #[test]
    fn clone_duplicates_string_payload() {
        let original = Value::String("hello".to_string());
        let cloned = original.clone();
        drop(original);
        assert_eq!(cloned.as_str(), Some("hello"));
    }

    #[test]
    fn zero_for_matches_data_type() {
        assert_eq!(Value::zero_for(&DataType::Int32), Value::Int32(0));
        assert_eq!(Value::zero_for(&DataType::String), Value::String(String::new()));
    }

    #[test]
    fn hash_is_consistent_with_numeric_equality() {
        let a = Value::Int32(7);
        let b = Value::Float64(7.0);
        assert_eq!(a, b);
        assert_eq!(a.hash_key(), b.hash_key());
    }
}
