//! Structured record values and index keys.

use crate::id::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// `f32` compared and hashed by bit pattern, so values can key maps.
#[derive(Debug, Clone, Copy)]
pub struct F32(pub f32);

impl PartialEq for F32 {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for F32 {}

impl Hash for F32 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// `f64` compared and hashed by bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct F64(pub f64);

impl PartialEq for F64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for F64 {}

impl Hash for F64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// A bean instance: the concrete bean type plus its hierarchy field values,
/// in hierarchy order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeanValue {
    pub bean: TypeId,
    pub fields: Vec<Value>,
}

impl BeanValue {
    pub fn new(bean: TypeId, fields: Vec<Value>) -> Self {
        Self { bean, fields }
    }

    pub fn field(&self, position: usize) -> Option<&Value> {
        self.fields.get(position)
    }
}

/// A typed data value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    /// Also carries `bigint` values.
    Long(i64),
    Float(F32),
    Double(F64),
    String(String),
    /// Localizable text: lookup key plus fallback text.
    Text { key: String, text: String },
    /// Seconds since the Unix epoch.
    DateTime(i64),
    Enum(i32),
    Bean(BeanValue),
    Array(Vec<Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    pub fn as_bean(&self) -> Option<&BeanValue> {
        match self {
            Value::Bean(b) => Some(b),
            _ => None,
        }
    }

    /// Integer view for sorting by key.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Short(v) => Some(i64::from(*v)),
            Value::Int(v) | Value::Enum(v) => Some(i64::from(*v)),
            Value::Long(v) | Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{v}")?;
            }
            Ok(())
        }
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Int(v) | Value::Enum(v) => write!(f, "{v}"),
            Value::Long(v) | Value::DateTime(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{}", v.0),
            Value::Double(v) => write!(f, "{}", v.0),
            Value::String(s) => write!(f, "{s}"),
            Value::Text { key, .. } => write!(f, "{key}"),
            Value::Bean(b) => {
                write!(f, "{{")?;
                join(f, &b.fields)?;
                write!(f, "}}")
            }
            Value::Array(items) | Value::List(items) | Value::Set(items) => {
                write!(f, "[")?;
                join(f, items)?;
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// An ordered tuple of one or more index field values. Equal iff same arity
/// and every position compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    pub fn single(value: Value) -> Self {
        Self(vec![value])
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [single] => write!(f, "{single}"),
            parts => {
                write!(f, "(")?;
                for (i, v) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn index_keys_compare_by_arity_and_position() {
        let a = IndexKey(vec![Value::Int(1), Value::String("x".into())]);
        let b = IndexKey(vec![Value::Int(1), Value::String("x".into())]);
        let c = IndexKey(vec![Value::Int(1)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn floats_hash_by_bits() {
        let mut set = HashSet::new();
        set.insert(Value::Float(F32(1.5)));
        assert!(set.contains(&Value::Float(F32(1.5))));
        assert_ne!(Value::Double(F64(0.0)), Value::Double(F64(-0.0)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(IndexKey::single(Value::Int(7)).to_string(), "7");
        assert_eq!(
            IndexKey(vec![Value::Int(1), Value::String("a".into())]).to_string(),
            "(1, a)"
        );
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1,2]"
        );
        assert_eq!(
            Value::Map(vec![(Value::Int(1), Value::Bool(true))]).to_string(),
            "{1:true}"
        );
    }

    #[test]
    fn integer_view() {
        assert_eq!(Value::Short(-3).as_i64(), Some(-3));
        assert_eq!(Value::Long(1 << 40).as_i64(), Some(1 << 40));
        assert_eq!(Value::String("1".into()).as_i64(), None);
    }
}
