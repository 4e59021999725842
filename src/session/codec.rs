// Record payload codec
// Encodes a session value mapping to self-describing bytes and back

use super::types::SessionValues;
use crate::error::{SessionError, SessionResult};

/// Encode a value mapping for a durable backend
pub fn encode(values: &SessionValues) -> SessionResult<Vec<u8>> {
    serde_json::to_vec(values).map_err(SessionError::from)
}

/// Decode a stored payload.
/// An empty payload is an empty mapping; anything else must parse.
pub fn decode(bytes: &[u8]) -> SessionResult<SessionValues> {
    if bytes.is_empty() {
        return Ok(SessionValues::new());
    }

    serde_json::from_slice(bytes).map_err(SessionError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::SessionValue;
    use std::collections::BTreeMap;

    #[test]
    fn test_empty_payload_is_empty_map() {
        assert!(decode(b"").unwrap().is_empty());
    }

    #[test]
    fn test_empty_map_round_trip() {
        let encoded = encode(&SessionValues::new()).unwrap();
        assert!(decode(&encoded).unwrap().is_empty());
    }

    #[test]
    fn test_nested_values_round_trip() {
        let mut inner = BTreeMap::new();
        inner.insert("theme".to_string(), SessionValue::from("dark"));
        inner.insert("ratio".to_string(), SessionValue::Float(0.5));

        let mut values = SessionValues::new();
        values.insert("uid".to_string(), SessionValue::Int(42));
        values.insert("flags".to_string(), SessionValue::List(vec![true.into(), SessionValue::Null]));
        values.insert("prefs".to_string(), SessionValue::Map(inner));
        values.insert("raw".to_string(), SessionValue::Bytes(vec![0, 255, 7]));

        let decoded = decode(&encode(&values).unwrap()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_corrupted_payload_is_an_error() {
        let result = decode(b"\x00\x01garbage");
        assert!(matches!(result, Err(SessionError::Codec(_))));
    }
}
