//! Key encoding and decoding for storage layer.
//!
//! Key format: `shard:{shard_id:010}`
//! The shard id is zero-padded to the width of `u32::MAX` so lexicographic
//! key order equals numeric shard order.

use feeder_types::ShardId;

use crate::error::StorageError;

const SHARD_PREFIX: &str = "shard";

/// Key for per-shard checkpoint entries
/// Format: shard:{shard_id:010}
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardKey {
    pub shard_id: ShardId,
}

impl ShardKey {
    pub fn new(shard_id: ShardId) -> Self {
        Self { shard_id }
    }

    /// Encode key to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}:{:010}", SHARD_PREFIX, self.shard_id).into_bytes()
    }

    /// Decode key from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StorageError> {
        let s = std::str::from_utf8(bytes)
            .map_err(|e| StorageError::Key(format!("not UTF-8: {}", e)))?;

        let (prefix, id) = s
            .split_once(':')
            .ok_or_else(|| StorageError::Key(s.to_string()))?;
        if prefix != SHARD_PREFIX {
            return Err(StorageError::Key(s.to_string()));
        }

        let shard_id: ShardId = id
            .parse()
            .map_err(|e| StorageError::Key(format!("bad shard id: {}", e)))?;

        Ok(Self { shard_id })
    }

    /// Prefix shared by every shard key, for full scans
    pub fn prefix() -> Vec<u8> {
        format!("{}:", SHARD_PREFIX).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_key_roundtrip() {
        let key = ShardKey::new(42);
        assert_eq!(key.to_bytes(), b"shard:0000000042".to_vec());
        let decoded = ShardKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
    }

    #[test]
    fn test_shard_key_lexicographic_order() {
        let key1 = ShardKey::new(9);
        let key2 = ShardKey::new(10);
        let key3 = ShardKey::new(u32::MAX);
        assert!(key1.to_bytes() < key2.to_bytes());
        assert!(key2.to_bytes() < key3.to_bytes());
    }

    #[test]
    fn test_shard_key_invalid() {
        assert!(ShardKey::from_bytes(b"outbox:0000000001").is_err());
        assert!(ShardKey::from_bytes(b"shard:abc").is_err());
        assert!(ShardKey::from_bytes(b"shard").is_err());
        assert!(ShardKey::from_bytes(&[0xff, 0xfe]).is_err());
    }
}
