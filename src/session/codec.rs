//! Binary encoding of session records.
//!
//! Records are stored as CBOR. Combined with the single-character field
//! names on [`SessionRecord`] this keeps a typical session to a few dozen
//! bytes while still carrying an arbitrary payload.

use crate::error::{Result, SessionError};

use super::record::SessionRecord;

/// Encode a record for storage.
pub fn encode(record: &SessionRecord) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    ciborium::ser::into_writer(record, &mut buf)
        .map_err(|e| SessionError::Serialization(format!("Failed to encode session: {}", e)))?;
    Ok(buf)
}

/// Decode a stored record.
pub fn decode(bytes: &[u8]) -> Result<SessionRecord> {
    ciborium::de::from_reader(bytes)
        .map_err(|e| SessionError::Serialization(format!("Failed to decode session: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::record::CallRecord;
    use serde_json::json;

    #[test]
    fn test_round_trip_empty_history() {
        let record = SessionRecord::new("id-1", "user1", 1_700_000_000_000);
        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_round_trip_populated_history() {
        let mut record = SessionRecord::new("id-2", "user1", 1_700_000_000_000);
        record.window = 170_000_000;
        *record.call_record_mut("/v1/users") = CallRecord { count: 4, last: 1_700_000_000_123 };
        *record.call_record_mut("/v1/orders") = CallRecord { count: 1, last: 1_700_000_000_456 };
        record.updated = 1_700_000_000_456;

        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_round_trip_nested_payload() {
        let mut record = SessionRecord::new("id-3", "user1", 5);
        let payload = record.payload_mut();
        payload.insert("plan", "pro");
        payload.insert("balance", -12);
        payload.insert("score", 2.25);
        payload.insert(
            "device",
            json!({ "os": "linux", "tags": ["a", "b"], "meta": { "beta": true, "seen": null } }),
        );

        let decoded = decode(&encode(&record).unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.payload.unwrap().get_str("plan"), Some("pro"));
    }

    #[test]
    fn test_field_tags_are_short() {
        let mut record = SessionRecord::new("x", "y", 0);
        record.call_record_mut("e");
        let bytes = encode(&record).unwrap();

        let value: ciborium::value::Value = ciborium::de::from_reader(&bytes[..]).unwrap();
        let keys: Vec<String> = value
            .as_map()
            .unwrap()
            .iter()
            .filter_map(|(k, _)| k.as_text().map(str::to_string))
            .collect();
        assert_eq!(keys, vec!["i", "o", "r", "w", "c", "u"]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode(&[0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(err, SessionError::Serialization(_)));
    }
}
