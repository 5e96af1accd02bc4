//! Factory functions for common test data
//!
//! Names are hashed into keys and node ids, so the same name always gives
//! the same key.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::core_dht::{Contact, DhtKey, DhtValue, Storable, ValueEntity, ValueType, Version};

/// A contact with a public IPv4 address derived from `name`
pub fn contact(name: &str) -> Contact {
    let node_id = DhtKey::hash_string(name);
    let b = node_id.as_bytes();
    let ip = Ipv4Addr::new(82, b[0], b[1], b[2].max(1));
    Contact::new(node_id, SocketAddr::new(IpAddr::V4(ip), 4000))
}

/// A contact with an explicit address
pub fn contact_at(name: &str, addr: &str) -> Contact {
    let address = addr.parse().unwrap_or_else(|e| panic!("bad test address {}: {}", addr, e));
    Contact::new(DhtKey::hash_string(name), address)
}

/// `count` distinct contacts
pub fn contacts(count: usize) -> Vec<Contact> {
    (0..count).map(|i| contact(&format!("peer-{}", i))).collect()
}

/// A value of the TEST type
pub fn test_value(payload: &str) -> DhtValue {
    DhtValue::new(ValueType::test(), Version::new(1, 0), payload.as_bytes().to_vec())
        .unwrap_or_else(|e| panic!("bad test value: {}", e))
}

/// A value stored directly by its creator, keyed by `key`'s hash
pub fn remote_entity(key: &str, creator: &str, payload: &str) -> ValueEntity {
    let creator = contact(creator);
    ValueEntity::new(creator, creator, DhtKey::hash_string(key), test_value(payload), false)
}

/// Like `remote_entity`, created `age` ago
pub fn remote_entity_aged(key: &str, creator: &str, age: Duration) -> ValueEntity {
    let creator = contact(creator);
    ValueEntity::with_creation_time(
        creator,
        creator,
        DhtKey::hash_string(key),
        test_value(key),
        false,
        SystemTime::now() - age,
    )
}

/// A never-published storable of the TEST type
pub fn storable(key: &str, payload: &str) -> Arc<Storable> {
    Arc::new(Storable::new(DhtKey::hash_string(key), test_value(payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixtures_are_deterministic() {
        assert_eq!(contact("a"), contact("a"));
        assert_ne!(contact("a").node_id, contact("b").node_id);
        assert!(contact("a").has_valid_address());
        assert!(!contact("a").has_private_address());
    }

    #[test]
    fn test_contacts_are_distinct() {
        let all = contacts(5);
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.node_id, b.node_id);
            }
        }
    }

    #[test]
    fn test_aged_entity() {
        let entity = remote_entity_aged("k", "a", Duration::from_secs(100));
        assert!(entity.creation_time().elapsed().unwrap() >= Duration::from_secs(100));
    }
}
