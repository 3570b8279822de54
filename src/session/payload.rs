//! Free-form data attached to a session.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Arbitrary key/value data carried by a session record.
///
/// The core never interprets it. Accessors return `None` when the key is
/// missing or holds a value of another type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Remove a value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Get the raw value for a key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_map(&self, key: &str) -> Option<&Map<String, Value>> {
        self.get(key).and_then(Value::as_object)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, Value)> for Payload {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_accessors() {
        let mut payload = Payload::new();
        payload.insert("name", "alice");
        payload.insert("level", 7);
        payload.insert("ratio", 0.5);
        payload.insert("admin", true);
        payload.insert("prefs", json!({ "theme": "dark" }));

        assert_eq!(payload.get_str("name"), Some("alice"));
        assert_eq!(payload.get_i64("level"), Some(7));
        assert_eq!(payload.get_u64("level"), Some(7));
        assert_eq!(payload.get_f64("ratio"), Some(0.5));
        assert_eq!(payload.get_bool("admin"), Some(true));
        assert_eq!(
            payload.get_map("prefs").and_then(|m| m.get("theme")),
            Some(&json!("dark"))
        );
        assert_eq!(payload.len(), 5);
    }

    #[test]
    fn test_type_mismatch_is_absent() {
        let mut payload = Payload::new();
        payload.insert("name", "alice");
        payload.insert("level", -3);

        assert_eq!(payload.get_i64("name"), None);
        assert_eq!(payload.get_bool("name"), None);
        assert_eq!(payload.get_map("name"), None);
        assert_eq!(payload.get_u64("level"), None);
        assert_eq!(payload.get_str("missing"), None);
    }

    #[test]
    fn test_insert_replaces() {
        let mut payload = Payload::new();
        assert!(payload.insert("k", 1).is_none());
        assert_eq!(payload.insert("k", 2), Some(json!(1)));
        assert_eq!(payload.remove("k"), Some(json!(2)));
        assert!(payload.is_empty());
    }
}
