/*
    DhtKey - 160-bit identifiers of the Kademlia keyspace

    Responsibilities:
    `dht_key.rs` defines the identifier used both as the primary key of a
    stored value (content id) and as the secondary key (creator node id).
    It handles: hashing into the keyspace (Blake3 truncated to 160 bits),
    XOR distance, ordering, bucket indexing and hex formatting.

    Inputs:
    - raw byte arrays
    - application domain keys

    Outputs:
    - 160-bit keys
    - key distance calculations
*/

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::{DhtError, DhtResult};

/// Length of a key in bytes
pub const KEY_LEN: usize = 20;

/// Length of a key in bits
pub const KEY_BITS: usize = KEY_LEN * 8;

/// 160-bit key in the XOR keyspace
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DhtKey([u8; KEY_LEN]);

impl DhtKey {
    /// The all-zero key
    pub const MIN: DhtKey = DhtKey([0u8; KEY_LEN]);

    /// The all-ones key
    pub const MAX: DhtKey = DhtKey([0xFFu8; KEY_LEN]);

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        DhtKey(bytes)
    }

    /// Create a key from a slice that must be exactly `KEY_LEN` bytes long
    pub fn try_from_slice(data: &[u8]) -> DhtResult<Self> {
        let bytes: [u8; KEY_LEN] = data.try_into().map_err(|_| {
            DhtError::Decode(format!("key must be {} bytes, got {}", KEY_LEN, data.len()))
        })?;
        Ok(DhtKey(bytes))
    }

    /// Parse a 40 character hex string
    pub fn from_hex(s: &str) -> DhtResult<Self> {
        let bytes = hex::decode(s).map_err(|e| DhtError::Decode(format!("invalid hex key: {}", e)))?;
        Self::try_from_slice(&bytes)
    }

    /// Hash arbitrary data into the keyspace (Blake3, first 160 bits)
    pub fn hash(data: &[u8]) -> Self {
        let hash = blake3::hash(data);
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&hash.as_bytes()[..KEY_LEN]);
        DhtKey(bytes)
    }

    pub fn hash_string(s: &str) -> Self {
        Self::hash(s.as_bytes())
    }

    /// Generate a random key
    pub fn random() -> Self {
        DhtKey(rand::random())
    }

    /// XOR distance between two keys
    pub fn distance(&self, other: &DhtKey) -> DhtKey {
        let mut result = [0u8; KEY_LEN];
        for (i, byte) in result.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        DhtKey(result)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Count leading zero bits
    pub fn leading_zeros(&self) -> u32 {
        let mut count = 0;
        for byte in &self.0 {
            if *byte == 0 {
                count += 8;
            } else {
                count += byte.leading_zeros();
                break;
            }
        }
        count
    }

    /// Index of the highest differing bit relative to `reference`, 0 for equal keys
    pub fn bucket_index(&self, reference: &DhtKey) -> usize {
        let leading = self.distance(reference).leading_zeros() as usize;
        if leading >= KEY_BITS {
            0
        } else {
            KEY_BITS - 1 - leading
        }
    }

    /// Check if this key is closer to `target` than `other` is
    pub fn is_closer(&self, other: &DhtKey, target: &DhtKey) -> bool {
        self.distance(target) < other.distance(target)
    }
}

impl fmt::Display for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

impl fmt::Debug for DhtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DhtKey({})", self.to_hex())
    }
}

impl From<[u8; KEY_LEN]> for DhtKey {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        DhtKey(bytes)
    }
}

impl From<DhtKey> for [u8; KEY_LEN] {
    fn from(key: DhtKey) -> Self {
        key.0
    }
}
