//! Session id generation and storage key formatting.

use sha2::{Digest, Sha256};

/// Generate an unguessable session id for `owner`.
///
/// The id is the hex SHA-256 of the owner, the creation time and a random
/// 64-bit value, so two sessions started for one owner in the same
/// millisecond still differ.
pub fn generate_session_id(owner: &str, now_ms: i64) -> String {
    let nonce: u64 = rand::random();
    hash(&format!("{}-{}-{}", owner, now_ms, nonce))
}

/// Hex encoded SHA-256 of `value`.
pub fn hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Storage key of a session: `{prefix}:{session_id}`.
pub fn session_key(prefix: &str, session_id: &str) -> String {
    format!("{}:{}", prefix, session_id)
}

/// Key of the online users sorted set: `online:{prefix}`.
pub fn online_users_key(prefix: &str) -> String {
    format!("online:{}", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_sha256_hex() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_generated_ids_are_unique_and_fixed_length() {
        let a = generate_session_id("user1", 1_000);
        let b = generate_session_id("user1", 1_000);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_keys() {
        assert_eq!(session_key("sess", "abc"), "sess:abc");
        assert_eq!(online_users_key("sess"), "online:sess");
    }
}
