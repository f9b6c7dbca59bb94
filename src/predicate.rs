/// Entry classification rules
///
/// A predicate looks at one `(key, value)` entry and either extracts a record
/// (a hex string written as one output line) or passes. Predicates keep no
/// state between entries.
///
/// Passing is never an error. The one error is an entry that matches a rule's
/// marker but then lacks the shape the rule extracts from: that breaks the
/// assumption the rule rests on, so the scan stops instead of skipping it.

use crate::address::ADDRESS_SIZE;
use crate::bencodex::{Key, Value};
use crate::error::{CensusError, Result};

pub trait EntryPredicate {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    fn extract(&self, key: &[u8], value: &Value) -> Result<Option<String>>;
}

/// Matches keys of exactly `width` bytes and extracts the key itself as hex.
/// Values are not inspected.
#[derive(Debug, Clone, Copy)]
pub struct FixedLengthKey {
    width: usize,
}

impl FixedLengthKey {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Keys that are addresses.
    pub fn address() -> Self {
        Self::new(ADDRESS_SIZE)
    }
}

impl EntryPredicate for FixedLengthKey {
    fn name(&self) -> &'static str {
        "fixed-length-key"
    }

    fn extract(&self, key: &[u8], _value: &Value) -> Result<Option<String>> {
        if key.len() == self.width {
            Ok(Some(hex::encode(key)))
        } else {
            Ok(None)
        }
    }
}

/// Marker key whose presence identifies a serialized agent.
pub const AGENT_MARKER_KEY: &str = "unlockedOptions";

/// Field holding the agent's address.
pub const AGENT_ADDRESS_KEY: &str = "address";

/// Heuristic for legacy agent records, which carry no schema tag.
///
/// A value counts as an agent if and only if it is a dictionary containing
/// the text key `unlockedOptions`. Any other record that happens to carry
/// that key is misclassified. The matched record's `address` field must be a
/// binary blob; its bytes are the extracted record.
#[derive(Debug, Clone)]
pub struct LegacyAgentShape {
    marker: Key,
    field: Key,
}

impl Default for LegacyAgentShape {
    fn default() -> Self {
        Self {
            marker: Key::from(AGENT_MARKER_KEY),
            field: Key::from(AGENT_ADDRESS_KEY),
        }
    }
}

impl EntryPredicate for LegacyAgentShape {
    fn name(&self) -> &'static str {
        "legacy-agent-shape"
    }

    fn extract(&self, _key: &[u8], value: &Value) -> Result<Option<String>> {
        let dict = match value.as_dictionary() {
            Some(dict) if dict.contains_key(&self.marker) => dict,
            _ => return Ok(None),
        };

        match dict.get(&self.field) {
            Some(Value::Binary(bytes)) => Ok(Some(hex::encode(bytes))),
            Some(other) => Err(CensusError::ExtractionShape {
                field: AGENT_ADDRESS_KEY,
                expected: "binary",
                found: other.kind().to_string(),
            }),
            None => Err(CensusError::ExtractionShape {
                field: AGENT_ADDRESS_KEY,
                expected: "binary",
                found: "nothing".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(address: &[u8]) -> Value {
        Value::dictionary([
            (AGENT_ADDRESS_KEY, Value::Binary(address.to_vec())),
            (AGENT_MARKER_KEY, Value::List(Vec::new())),
            ("avatarAddresses", Value::Dictionary(Default::default())),
        ])
    }

    #[test]
    fn test_fixed_length_key_matches_exact_width_only() {
        let predicate = FixedLengthKey::address();
        for len in 0..64usize {
            let key: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let result = predicate.extract(&key, &Value::Null).unwrap();
            if len == ADDRESS_SIZE {
                assert_eq!(result, Some(hex::encode(&key)));
            } else {
                assert_eq!(result, None, "len {}", len);
            }
        }
    }

    #[test]
    fn test_fixed_length_key_ignores_value() {
        let predicate = FixedLengthKey::address();
        let key = [0xabu8; ADDRESS_SIZE];
        let a = predicate.extract(&key, &Value::Null).unwrap();
        let b = predicate.extract(&key, &agent(&[1, 2])).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.unwrap(), "ab".repeat(ADDRESS_SIZE));
    }

    #[test]
    fn test_agent_shape_extracts_address_bytes() {
        let predicate = LegacyAgentShape::default();
        let bytes = [0x0fu8, 0xa0, 0x01];
        let result = predicate.extract(b"any key", &agent(&bytes)).unwrap();
        assert_eq!(result, Some("0fa001".to_string()));
    }

    #[test]
    fn test_agent_shape_without_marker_passes() {
        let predicate = LegacyAgentShape::default();
        let value = Value::dictionary([(AGENT_ADDRESS_KEY, Value::Binary(vec![1; 20]))]);
        assert_eq!(predicate.extract(b"k", &value).unwrap(), None);
    }

    #[test]
    fn test_agent_shape_non_dictionary_passes() {
        let predicate = LegacyAgentShape::default();
        for value in [
            Value::Null,
            Value::Binary(b"unlockedOptions".to_vec()),
            Value::Text(AGENT_MARKER_KEY.to_string()),
            Value::List(vec![Value::Text(AGENT_MARKER_KEY.to_string())]),
        ] {
            assert_eq!(predicate.extract(b"k", &value).unwrap(), None);
        }
    }

    #[test]
    fn test_agent_shape_marker_as_binary_key_passes() {
        let predicate = LegacyAgentShape::default();
        let mut map = std::collections::BTreeMap::new();
        map.insert(Key::Binary(AGENT_MARKER_KEY.as_bytes().to_vec()), Value::Null);
        map.insert(Key::from(AGENT_ADDRESS_KEY), Value::Binary(vec![1]));
        assert_eq!(predicate.extract(b"k", &Value::Dictionary(map)).unwrap(), None);
    }

    #[test]
    fn test_agent_shape_wrong_field_type_is_fatal() {
        let predicate = LegacyAgentShape::default();
        let value = Value::dictionary([
            (AGENT_ADDRESS_KEY, Value::Text("not bytes".to_string())),
            (AGENT_MARKER_KEY, Value::Null),
        ]);
        match predicate.extract(b"k", &value) {
            Err(CensusError::ExtractionShape { field, found, .. }) => {
                assert_eq!(field, AGENT_ADDRESS_KEY);
                assert_eq!(found, "text");
            }
            other => panic!("expected extraction failure, got {:?}", other),
        }
    }

    #[test]
    fn test_agent_shape_missing_field_is_fatal() {
        let predicate = LegacyAgentShape::default();
        let value = Value::dictionary([(AGENT_MARKER_KEY, Value::Null)]);
        assert!(matches!(
            predicate.extract(b"k", &value),
            Err(CensusError::ExtractionShape { .. })
        ));
    }
}
