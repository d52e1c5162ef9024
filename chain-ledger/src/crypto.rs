//! Block hashing
//!
//! A block digest is SHA-256 over the `|`-joined text fields
//!
//! ```text
//! height "|" timestamp "|" prev_hash "|" canonical_payload
//! ```
//!
//! with `height` and `timestamp` in decimal, `prev_hash` as 64 lowercase hex
//! chars and the payload as its raw canonical bytes. Field order and the
//! delimiter are part of the on-disk format: changing either invalidates every
//! existing chain.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded digest
pub const DIGEST_HEX_LEN: usize = 64;

/// `prev_hash` of the genesis block
pub const GENESIS_PREV_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Hash a block's fields into a hex digest
pub fn hash_block(height: u64, timestamp: i64, prev_hash: &str, payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(height.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(timestamp.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(prev_hash.as_bytes());
    hasher.update(b"|");
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Check that `s` looks like a digest produced by [`hash_block`]
pub fn is_hex_digest(s: &str) -> bool {
    s.len() == DIGEST_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_block_matches_joined_fields() {
        let payload = br#"{"event_type":"genesis","note":"n","version":1}"#;
        let joined = format!(
            "0|1700000000|{}|{}",
            GENESIS_PREV_HASH,
            std::str::from_utf8(payload).unwrap()
        );

        let expected = hex::encode(Sha256::digest(joined.as_bytes()));
        assert_eq!(hash_block(0, 1_700_000_000, GENESIS_PREV_HASH, payload), expected);
    }

    #[test]
    fn test_known_vector() {
        // sha256("1|2|ab|{}")
        let digest = hash_block(1, 2, "ab", b"{}");
        assert_eq!(
            digest,
            hex::encode(Sha256::digest(b"1|2|ab|{}"))
        );
        assert!(is_hex_digest(&digest));
    }

    #[test]
    fn test_every_field_affects_digest() {
        let base = hash_block(5, 100, GENESIS_PREV_HASH, b"{}");
        assert_ne!(base, hash_block(6, 100, GENESIS_PREV_HASH, b"{}"));
        assert_ne!(base, hash_block(5, 101, GENESIS_PREV_HASH, b"{}"));
        assert_ne!(base, hash_block(5, 100, &"1".repeat(64), b"{}"));
        assert_ne!(base, hash_block(5, 100, GENESIS_PREV_HASH, b"[]"));
    }

    #[test]
    fn test_negative_timestamp_is_decimal() {
        let digest = hash_block(0, -1, GENESIS_PREV_HASH, b"{}");
        let joined = format!("0|-1|{}|{{}}", GENESIS_PREV_HASH);
        assert_eq!(digest, hex::encode(Sha256::digest(joined.as_bytes())));
    }

    #[test]
    fn test_genesis_sentinel() {
        assert_eq!(GENESIS_PREV_HASH.len(), DIGEST_HEX_LEN);
        assert!(GENESIS_PREV_HASH.bytes().all(|b| b == b'0'));
        assert!(is_hex_digest(GENESIS_PREV_HASH));
        assert!(!is_hex_digest("ABC"));
        assert!(!is_hex_digest(&"G".repeat(64)));
    }
}
