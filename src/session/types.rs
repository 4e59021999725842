// Session value types and data structures

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Value mapping held by one session record
pub type SessionValues = HashMap<String, SessionValue>;

/// A value stored in a session.
///
/// The set of variants is closed so every backend can serialize records
/// without knowing anything about the application types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SessionValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<SessionValue>),
    Map(BTreeMap<String, SessionValue>),
}

impl SessionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SessionValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SessionValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SessionValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SessionValue::Null)
    }
}

impl From<bool> for SessionValue {
    fn from(v: bool) -> Self {
        SessionValue::Bool(v)
    }
}

impl From<i64> for SessionValue {
    fn from(v: i64) -> Self {
        SessionValue::Int(v)
    }
}

impl From<i32> for SessionValue {
    fn from(v: i32) -> Self {
        SessionValue::Int(v as i64)
    }
}

impl From<f64> for SessionValue {
    fn from(v: f64) -> Self {
        SessionValue::Float(v)
    }
}

impl From<&str> for SessionValue {
    fn from(v: &str) -> Self {
        SessionValue::Text(v.to_string())
    }
}

impl From<String> for SessionValue {
    fn from(v: String) -> Self {
        SessionValue::Text(v)
    }
}

impl From<Vec<u8>> for SessionValue {
    fn from(v: Vec<u8>) -> Self {
        SessionValue::Bytes(v)
    }
}

impl From<Vec<SessionValue>> for SessionValue {
    fn from(v: Vec<SessionValue>) -> Self {
        SessionValue::List(v)
    }
}

impl From<BTreeMap<String, SessionValue>> for SessionValue {
    fn from(v: BTreeMap<String, SessionValue>) -> Self {
        SessionValue::Map(v)
    }
}

impl<T: Into<SessionValue>> From<Option<T>> for SessionValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SessionValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(SessionValue::from(7), SessionValue::Int(7));
        assert_eq!(SessionValue::from("abc").as_str(), Some("abc"));
        assert_eq!(SessionValue::from(true).as_bool(), Some(true));
        assert!(SessionValue::from(None::<i64>).is_null());
    }

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_string(&SessionValue::Int(3)).unwrap();
        assert_eq!(json, r#"{"type":"int","value":3}"#);

        let null = serde_json::to_string(&SessionValue::Null).unwrap();
        assert_eq!(null, r#"{"type":"null"}"#);
    }
}
