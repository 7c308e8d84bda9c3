//! Runtime values
//!
//! Formatting and truthiness follow Go's `text/template` so rendered output
//! matches what existing packages expect: lists print as `[a b]`, maps as
//! `map[k:v]` with sorted keys.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use clusterpack_core::SetterValue;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Go truthiness: false, zero, nil and empty collections are false
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float64",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Length of strings and collections
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.len()),
            Value::List(l) => Some(l.len()),
            Value::Map(m) => Some(m.len()),
            _ => None,
        }
    }

    /// Text written for `{{ pipeline }}`
    pub fn to_output(&self) -> String {
        match self {
            Value::Nil => "<no value>".to_string(),
            other => other.to_string(),
        }
    }

    /// Go `eq` semantics: numbers compare across int and float, other kinds
    /// must match
    pub fn basic_eq(&self, other: &Value) -> Result<bool, String> {
        match (self, other) {
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => Ok(*a as f64 == *b),
            (Value::List(_), _) | (Value::Map(_), _) | (_, Value::List(_)) | (_, Value::Map(_)) => {
                Err(format!(
                    "non-comparable types {} and {}",
                    self.type_name(),
                    other.type_name()
                ))
            }
            (Value::Nil, _) | (_, Value::Nil) => Ok(self == other),
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => Ok(a == b),
            (a, b) => Err(format!(
                "incompatible types for comparison: {} and {}",
                a.type_name(),
                b.type_name()
            )),
        }
    }

    /// Ordering for `lt`, `le`, `gt` and `ge`
    pub fn basic_cmp(&self, other: &Value) -> Result<Ordering, String> {
        let ordering = match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => {
                return Err(format!(
                    "incompatible types for comparison: {} and {}",
                    self.type_name(),
                    other.type_name()
                ));
            }
        };
        ordering.ok_or_else(|| "invalid comparison of NaN".to_string())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("map[")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{}", k, v)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<Vec<String>> for Value {
    fn from(items: Vec<String>) -> Self {
        Value::List(items.into_iter().map(Value::String).collect())
    }
}

impl From<&SetterValue> for Value {
    fn from(value: &SetterValue) -> Self {
        match value {
            SetterValue::Scalar(s) => Value::String(s.clone()),
            SetterValue::Enum { value, .. } => Value::String(value.clone()),
            SetterValue::List(items) => Value::from(items.clone()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_go_formatting() {
        let list = Value::from(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(list.to_string(), "[a b]");

        let map = Value::Map(BTreeMap::from([
            ("z".to_string(), Value::Int(1)),
            ("a".to_string(), Value::Bool(true)),
        ]));
        assert_eq!(map.to_string(), "map[a:true z:1]");

        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Nil.to_output(), "<no value>");
    }

    #[test]
    fn test_truthiness() {
        for falsy in [
            Value::Nil,
            Value::Bool(false),
            Value::Int(0),
            Value::String(String::new()),
            Value::List(vec![]),
        ] {
            assert!(!falsy.is_truthy(), "{:?}", falsy);
        }
        assert!(Value::from("x").is_truthy());
        assert!(Value::Int(-1).is_truthy());
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(Value::Int(2).basic_eq(&Value::Float(2.0)), Ok(true));
        assert_eq!(Value::from("a").basic_eq(&Value::from("a")), Ok(true));
        assert!(Value::from("1").basic_eq(&Value::Int(1)).is_err());
        assert!(Value::List(vec![]).basic_eq(&Value::List(vec![])).is_err());
        assert_eq!(Value::from("a").basic_cmp(&Value::from("b")), Ok(Ordering::Less));
        assert_eq!(Value::Int(3).basic_cmp(&Value::Float(2.5)), Ok(Ordering::Greater));
    }

    #[test]
    fn test_setter_conversion() {
        let value = Value::from(&SetterValue::Enum {
            key: "small".into(),
            value: "t3.small".into(),
        });
        assert_eq!(value, Value::from("t3.small"));
    }
}
