/*
    Database - local record store of the DHT node

    Responsibilities:
    `dht_storage.rs` holds every value this node stores, its own and those
    other nodes asked it to keep. Records live in bags keyed by primary key,
    one record per creator inside a bag.
    It handles:
    - admission (creator validation, per-address and per-network flood
      limits, then the pluggable admission policy)
    - deletion through empty values
    - request load estimation per key
    - the single-lock scan used by the database cleaner

    Every operation takes the store lock once, so callers never observe a
    half-applied change. Clones share the same underlying store.

    Inputs:
    - store(entity), remove(primary, secondary), get(primary)
    - request_load(primary, increment)
    - retain(predicate) from the cleaner

    Outputs:
    - stored entities and bags
    - key and value counts
*/

use metrics::{counter, gauge};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, trace};

use super::admission::AdmissionPolicy;
use super::bag::{RequestLoadParams, ValueEntityBag};
use super::contact::{CLASS_C_NETMASK, IPV4_ADDRESS_NETMASK};
use super::dht_config::DhtConfig;
use super::dht_key::DhtKey;
use super::errors::{DhtError, DhtResult};
use super::value_entity::ValueEntity;

/// Flood protection settings applied before the admission policy
#[derive(Debug, Clone, Copy)]
pub struct DatabaseLimits {
    pub validate_value_creator: bool,
    pub max_values_per_address: Option<usize>,
    pub max_values_per_network: Option<usize>,
}

impl DatabaseLimits {
    pub fn unlimited() -> Self {
        DatabaseLimits {
            validate_value_creator: false,
            max_values_per_address: None,
            max_values_per_network: None,
        }
    }

    pub fn from_config(config: &DhtConfig) -> Self {
        DatabaseLimits {
            validate_value_creator: config.validate_value_creator,
            max_values_per_address: config
                .limit_values_per_address
                .then_some(config.max_values_per_address),
            max_values_per_network: config
                .limit_values_per_network
                .then_some(config.max_values_per_network),
        }
    }
}

/// Key and value counts at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatabaseStats {
    pub keys: usize,
    pub values: usize,
}

#[derive(Default)]
struct DatabaseInner {
    bags: HashMap<DhtKey, ValueEntityBag>,
    /// Masked creator address -> number of stored remote values
    values_per_address: HashMap<u32, usize>,
    /// Masked creator network -> number of stored remote values
    values_per_network: HashMap<u32, usize>,
    value_count: usize,
}

impl DatabaseInner {
    fn add(&mut self, entity: ValueEntity) {
        let primary_key = *entity.primary_key();
        self.count(&entity, true);
        let replaced = self
            .bags
            .entry(primary_key)
            .or_insert_with(|| ValueEntityBag::new(primary_key))
            .put(entity);

        match replaced {
            Some(old) => self.count(&old, false),
            None => self.value_count += 1,
        }
    }

    fn remove(&mut self, primary_key: &DhtKey, secondary_key: &DhtKey) -> Option<ValueEntity> {
        let bag = self.bags.get_mut(primary_key)?;
        let removed = bag.remove(secondary_key)?;
        if bag.is_empty() {
            self.bags.remove(primary_key);
        }
        self.value_count -= 1;
        self.count(&removed, false);
        Some(removed)
    }

    fn count(&mut self, entity: &ValueEntity, increment: bool) {
        if entity.is_local() {
            return;
        }

        let creator = entity.creator();
        if let Some(addr) = creator.masked_ipv4(IPV4_ADDRESS_NETMASK) {
            adjust(&mut self.values_per_address, addr, increment);
        }
        if let Some(net) = creator.masked_ipv4(CLASS_C_NETMASK) {
            adjust(&mut self.values_per_network, net, increment);
        }
    }

    fn stored_from(map: &HashMap<u32, usize>, entity: &ValueEntity, netmask: u32) -> usize {
        if entity.is_local() {
            return 0;
        }
        entity
            .creator()
            .masked_ipv4(netmask)
            .and_then(|masked| map.get(&masked).copied())
            .unwrap_or(0)
    }
}

fn adjust(map: &mut HashMap<u32, usize>, masked: u32, increment: bool) {
    if increment {
        *map.entry(masked).or_insert(0) += 1;
    } else if let Some(count) = map.get_mut(&masked) {
        *count -= 1;
        if *count == 0 {
            map.remove(&masked);
        }
    }
}

/// `previous` is a counted record whose creator masks to the same value as
/// `entity`'s creator
fn same_origin(previous: Option<&ValueEntity>, entity: &ValueEntity, netmask: u32) -> bool {
    match previous {
        Some(previous) if !previous.is_local() => {
            let masked = previous.creator().masked_ipv4(netmask);
            masked.is_some() && masked == entity.creator().masked_ipv4(netmask)
        }
        _ => false,
    }
}

/// Read-only view of the locked store, handed to admission policies
pub struct DatabaseView<'a> {
    inner: &'a DatabaseInner,
}

impl DatabaseView<'_> {
    pub fn key_count(&self) -> usize {
        self.inner.bags.len()
    }

    pub fn value_count(&self) -> usize {
        self.inner.value_count
    }

    pub fn contains(&self, primary_key: &DhtKey, secondary_key: &DhtKey) -> bool {
        self.inner.bags.get(primary_key).is_some_and(|bag| bag.contains(secondary_key))
    }

    /// Remote values stored from the same IPv4 address as `entity`'s creator
    pub fn values_per_address(&self, entity: &ValueEntity) -> usize {
        DatabaseInner::stored_from(&self.inner.values_per_address, entity, IPV4_ADDRESS_NETMASK)
    }

    /// Remote values stored from the same /24 network as `entity`'s creator
    pub fn values_per_network(&self, entity: &ValueEntity) -> usize {
        DatabaseInner::stored_from(&self.inner.values_per_network, entity, CLASS_C_NETMASK)
    }
}

/// In-memory store of value entities
#[derive(Clone)]
pub struct Database {
    inner: Arc<RwLock<DatabaseInner>>,
    policy: Arc<RwLock<Option<Arc<dyn AdmissionPolicy>>>>,
    limits: DatabaseLimits,
    load_params: RequestLoadParams,
}

impl Database {
    /// A database without flood limits or admission policy
    pub fn new() -> Self {
        Database {
            inner: Arc::new(RwLock::new(DatabaseInner::default())),
            policy: Arc::new(RwLock::new(None)),
            limits: DatabaseLimits::unlimited(),
            load_params: RequestLoadParams::default(),
        }
    }

    pub fn with_config(config: &DhtConfig) -> Self {
        Database {
            limits: DatabaseLimits::from_config(config),
            load_params: RequestLoadParams {
                smoothing: config.request_load_smoothing,
                nulling_delay: config.request_load_nulling_delay,
            },
            ..Self::new()
        }
    }

    /// Install or clear the admission policy. Without one every store is admitted.
    pub fn set_admission_policy(&self, policy: Option<Arc<dyn AdmissionPolicy>>) {
        let mut current = self.policy.write().unwrap_or_else(|e| e.into_inner());
        *current = policy;
    }

    /// Store an entity. Returns whether the store changed anything.
    ///
    /// An empty value removes the creator's record under the key and reports
    /// whether there was one. Otherwise the entity is inserted or replaces
    /// the creator's previous record, unless admission rejects it.
    pub fn store(&self, entity: ValueEntity) -> DhtResult<bool> {
        let mut inner =
            self.inner.write().map_err(|e| DhtError::lock("database write lock", e))?;

        if entity.value().is_empty() {
            let removed = inner.remove(entity.primary_key(), entity.secondary_key()).is_some();
            if removed {
                counter!("dht.db.removed").increment(1);
                trace!(key = %entity.primary_key(), creator = %entity.creator(), "Deleted value");
            }
            Self::update_gauges(&inner);
            return Ok(removed);
        }

        if !self.allow_store(&inner, &entity) {
            counter!("dht.db.rejected").increment(1);
            debug!(entity = %entity, "Store rejected");
            return Ok(false);
        }

        trace!(entity = %entity, "Storing value");
        inner.add(entity);
        counter!("dht.db.stored").increment(1);
        Self::update_gauges(&inner);
        Ok(true)
    }

    fn allow_store(&self, inner: &DatabaseInner, entity: &ValueEntity) -> bool {
        let bag = inner.bags.get(entity.primary_key());
        let view = DatabaseView { inner };

        if !entity.is_local() {
            if self.limits.validate_value_creator && !entity.is_direct() {
                let creator = entity.creator();
                if !creator.has_valid_address() {
                    debug!(creator = %creator, "Creator has an invalid address");
                    return false;
                }
                if creator.has_private_address() {
                    debug!(creator = %creator, "Creator has a private address");
                    return false;
                }
            }

            // A replacement charged to the same address or network as the
            // record it replaces leaves that count unchanged
            let previous = bag.and_then(|b| b.get(entity.secondary_key()));
            if let Some(max) = self.limits.max_values_per_address {
                if !same_origin(previous, entity, IPV4_ADDRESS_NETMASK)
                    && view.values_per_address(entity) >= max
                {
                    debug!(creator = %entity.creator(), max, "Too many values from address");
                    return false;
                }
            }
            if let Some(max) = self.limits.max_values_per_network {
                if !same_origin(previous, entity, CLASS_C_NETMASK)
                    && view.values_per_network(entity) >= max
                {
                    debug!(creator = %entity.creator(), max, "Too many values from network");
                    return false;
                }
            }
        }

        let policy = self.policy.read().unwrap_or_else(|e| e.into_inner()).clone();
        match policy {
            Some(policy) => policy.allow_store(&view, bag, entity),
            None => true,
        }
    }

    /// Remove the record stored by `secondary_key` under `primary_key`
    pub fn remove(
        &self,
        primary_key: &DhtKey,
        secondary_key: &DhtKey,
    ) -> DhtResult<Option<ValueEntity>> {
        let mut inner =
            self.inner.write().map_err(|e| DhtError::lock("database write lock", e))?;
        let removed = inner.remove(primary_key, secondary_key);
        if removed.is_some() {
            counter!("dht.db.removed").increment(1);
            Self::update_gauges(&inner);
        }
        Ok(removed)
    }

    pub fn contains(&self, primary_key: &DhtKey, secondary_key: &DhtKey) -> DhtResult<bool> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(DatabaseView { inner: &inner }.contains(primary_key, secondary_key))
    }

    /// Snapshot of the bag stored under `primary_key`
    pub fn get(&self, primary_key: &DhtKey) -> DhtResult<Option<ValueEntityBag>> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(inner.bags.get(primary_key).cloned())
    }

    pub fn key_set(&self) -> DhtResult<HashSet<DhtKey>> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(inner.bags.keys().copied().collect())
    }

    /// Snapshot of every stored record
    pub fn values(&self) -> DhtResult<Vec<ValueEntity>> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        let mut values = Vec::with_capacity(inner.value_count);
        for bag in inner.bags.values() {
            values.extend(bag.values().cloned());
        }
        Ok(values)
    }

    pub fn key_count(&self) -> DhtResult<usize> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(inner.bags.len())
    }

    pub fn value_count(&self) -> DhtResult<usize> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(inner.value_count)
    }

    pub fn stats(&self) -> DhtResult<DatabaseStats> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(DatabaseStats { keys: inner.bags.len(), values: inner.value_count })
    }

    pub fn clear(&self) -> DhtResult<()> {
        let mut inner =
            self.inner.write().map_err(|e| DhtError::lock("database write lock", e))?;
        *inner = DatabaseInner::default();
        Self::update_gauges(&inner);
        Ok(())
    }

    /// Request load of `primary_key`, counting this call as a request if
    /// `increment` is set. Unknown keys report zero.
    pub fn request_load(&self, primary_key: &DhtKey, increment: bool) -> DhtResult<f32> {
        let mut inner =
            self.inner.write().map_err(|e| DhtError::lock("database write lock", e))?;
        Ok(inner
            .bags
            .get_mut(primary_key)
            .map(|bag| bag.request_load(increment, Instant::now(), self.load_params))
            .unwrap_or(0.0))
    }

    /// Remove every record for which `keep` returns false, holding the
    /// write lock for the whole scan. Returns the removed records.
    pub fn retain<F>(&self, mut keep: F) -> DhtResult<Vec<ValueEntity>>
    where
        F: FnMut(&ValueEntity) -> bool,
    {
        let mut inner =
            self.inner.write().map_err(|e| DhtError::lock("database write lock", e))?;

        let mut removed = Vec::new();
        for bag in inner.bags.values_mut() {
            removed.extend(bag.retain(&mut keep));
        }

        if !removed.is_empty() {
            inner.bags.retain(|_, bag| !bag.is_empty());
            inner.value_count -= removed.len();
            for entity in &removed {
                inner.count(entity, false);
            }
            counter!("dht.db.removed").increment(removed.len() as u64);
            Self::update_gauges(&inner);
        }
        Ok(removed)
    }

    /// Remote values currently stored from `entity`'s creator address
    pub fn values_per_address(&self, entity: &ValueEntity) -> DhtResult<usize> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(DatabaseView { inner: &inner }.values_per_address(entity))
    }

    /// Remote values currently stored from `entity`'s creator /24 network
    pub fn values_per_network(&self, entity: &ValueEntity) -> DhtResult<usize> {
        let inner = self.inner.read().map_err(|e| DhtError::lock("database read lock", e))?;
        Ok(DatabaseView { inner: &inner }.values_per_network(entity))
    }

    fn update_gauges(inner: &DatabaseInner) {
        gauge!("dht.db.keys").set(inner.bags.len() as f64);
        gauge!("dht.db.values").set(inner.value_count as f64);
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_dht::admission::AdmissionPolicy;
    use crate::core_dht::contact::Contact;
    use crate::core_dht::dht_value::{DhtValue, Version};
    use crate::core_dht::value_type::ValueType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn value(s: &str) -> DhtValue {
        DhtValue::new(ValueType::test(), Version::new(1, 0), s.as_bytes().to_vec()).unwrap()
    }

    fn contact(name: &str, addr: &str) -> Contact {
        Contact::new(DhtKey::hash_string(name), addr.parse().unwrap())
    }

    fn entity(key: DhtKey, creator: &str, v: &str) -> ValueEntity {
        let c = contact(creator, "82.1.2.3:4000");
        ValueEntity::new(c, c, key, value(v), false)
    }

    fn delete(key: DhtKey, creator: &str) -> ValueEntity {
        let c = contact(creator, "82.1.2.3:4000");
        ValueEntity::new(c, c, key, DhtValue::empty(), false)
    }

    #[test]
    fn test_store_and_get() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");

        assert!(db.store(entity(key, "alice", "hello")).unwrap());
        let bag = db.get(&key).unwrap().unwrap();
        let stored = bag.get(&DhtKey::hash_string("alice")).unwrap();
        assert_eq!(stored.value().payload(), b"hello");
        assert!(db.contains(&key, &DhtKey::hash_string("alice")).unwrap());
    }

    #[test]
    fn test_multiple_creators_share_a_bag() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");

        db.store(entity(key, "alice", "a")).unwrap();
        db.store(entity(key, "bob", "b")).unwrap();

        assert_eq!(db.get(&key).unwrap().unwrap().len(), 2);
        assert_eq!(db.key_count().unwrap(), 1);
        assert_eq!(db.value_count().unwrap(), 2);
    }

    #[test]
    fn test_overwrite_keeps_counts() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");

        db.store(entity(key, "alice", "one")).unwrap();
        db.store(entity(key, "alice", "two")).unwrap();

        assert_eq!(db.value_count().unwrap(), 1);
        let bag = db.get(&key).unwrap().unwrap();
        assert_eq!(bag.get(&DhtKey::hash_string("alice")).unwrap().value().payload(), b"two");
    }

    #[test]
    fn test_empty_value_deletes() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");

        db.store(entity(key, "alice", "a")).unwrap();
        db.store(entity(key, "bob", "b")).unwrap();

        assert!(db.store(delete(key, "alice")).unwrap());
        assert!(!db.contains(&key, &DhtKey::hash_string("alice")).unwrap());
        assert_eq!(db.value_count().unwrap(), 1);

        // Deleting the last record drops the key
        assert!(db.store(delete(key, "bob")).unwrap());
        assert_eq!(db.key_count().unwrap(), 0);
        assert!(db.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_empty_value_on_missing_record() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");
        db.store(entity(key, "bob", "b")).unwrap();

        assert!(!db.store(delete(key, "alice")).unwrap());
        assert!(!db.store(delete(DhtKey::hash(b"other"), "alice")).unwrap());
        assert_eq!(db.stats().unwrap(), DatabaseStats { keys: 1, values: 1 });
    }

    #[test]
    fn test_remove() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");
        db.store(entity(key, "alice", "a")).unwrap();

        let removed = db.remove(&key, &DhtKey::hash_string("alice")).unwrap();
        assert_eq!(removed.unwrap().value().payload(), b"a");
        assert!(db.remove(&key, &DhtKey::hash_string("alice")).unwrap().is_none());
        assert_eq!(db.value_count().unwrap(), 0);
    }

    #[test]
    fn test_key_set_and_values() {
        let db = Database::new();
        let k1 = DhtKey::hash(b"k1");
        let k2 = DhtKey::hash(b"k2");

        db.store(entity(k1, "alice", "a")).unwrap();
        db.store(entity(k1, "bob", "b")).unwrap();
        db.store(entity(k2, "alice", "c")).unwrap();

        let keys = db.key_set().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&k1) && keys.contains(&k2));
        assert_eq!(db.values().unwrap().len(), 3);
    }

    #[test]
    fn test_clear() {
        let db = Database::new();
        db.store(entity(DhtKey::hash(b"k1"), "alice", "a")).unwrap();
        db.store(entity(DhtKey::hash(b"k2"), "alice", "b")).unwrap();

        db.clear().unwrap();
        assert_eq!(db.stats().unwrap(), DatabaseStats::default());
    }

    struct RejectAll(AtomicUsize);

    impl AdmissionPolicy for RejectAll {
        fn allow_store(
            &self,
            _view: &DatabaseView<'_>,
            _bag: Option<&ValueEntityBag>,
            _entity: &ValueEntity,
        ) -> bool {
            self.0.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    #[test]
    fn test_admission_policy_rejects_silently() {
        let db = Database::new();
        let policy = Arc::new(RejectAll(AtomicUsize::new(0)));
        db.set_admission_policy(Some(policy.clone()));

        let key = DhtKey::hash(b"key");
        assert!(!db.store(entity(key, "alice", "a")).unwrap());
        assert_eq!(db.value_count().unwrap(), 0);
        assert_eq!(policy.0.load(Ordering::SeqCst), 1);

        db.set_admission_policy(None);
        assert!(db.store(entity(key, "alice", "a")).unwrap());
    }

    #[test]
    fn test_delete_bypasses_admission_policy() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");
        db.store(entity(key, "alice", "a")).unwrap();

        let policy = Arc::new(RejectAll(AtomicUsize::new(0)));
        db.set_admission_policy(Some(policy.clone()));
        assert!(db.store(delete(key, "alice")).unwrap());
        assert_eq!(policy.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_values_per_address_limit() {
        let config = DhtConfig::default().with_creator_validation(false);
        let db = Database::with_config(&config);

        for i in 0..config.max_values_per_address {
            let key = DhtKey::hash(format!("key{}", i).as_bytes());
            assert!(db.store(entity(key, "alice", "v")).unwrap());
        }

        let probe = entity(DhtKey::hash(b"one-more"), "alice", "v");
        assert_eq!(db.values_per_address(&probe).unwrap(), config.max_values_per_address);
        assert!(!db.store(probe).unwrap());

        // Overwriting an existing record is not a new value
        assert!(db.store(entity(DhtKey::hash(b"key0"), "alice", "v2")).unwrap());

        // Removing frees a slot
        db.remove(&DhtKey::hash(b"key0"), &DhtKey::hash_string("alice")).unwrap();
        assert!(db.store(entity(DhtKey::hash(b"one-more"), "alice", "v")).unwrap());
    }

    #[test]
    fn test_values_per_network_limit() {
        let mut config = DhtConfig::default().with_creator_validation(false);
        config.limit_values_per_address = false;
        config.max_values_per_network = 2;
        let db = Database::with_config(&config);
        let key = DhtKey::hash(b"key");

        for (i, addr) in ["82.1.2.3:1", "82.1.2.4:1"].iter().enumerate() {
            let c = contact(&format!("node{}", i), addr);
            assert!(db.store(ValueEntity::new(c, c, key, value("v"), false)).unwrap());
        }

        let same_net = contact("node9", "82.1.2.200:1");
        assert!(!db.store(ValueEntity::new(same_net, same_net, key, value("v"), false)).unwrap());

        let other_net = contact("node10", "82.1.3.1:1");
        assert!(db.store(ValueEntity::new(other_net, other_net, key, value("v"), false)).unwrap());
    }

    #[test]
    fn test_moving_creator_is_charged_at_new_address() {
        let mut config = DhtConfig::default().with_creator_validation(false);
        config.limit_values_per_network = false;
        config.max_values_per_address = 1;
        let db = Database::with_config(&config);
        let key = DhtKey::hash(b"key");

        let full = contact("resident", "82.1.2.3:4000");
        assert!(db.store(ValueEntity::new(full, full, key, value("v"), false)).unwrap());

        let before = contact("mover", "90.9.9.9:4000");
        assert!(db.store(ValueEntity::new(before, before, key, value("v1"), false)).unwrap());

        // Same creator id, now reporting from the address that is already full
        let after = contact("mover", "82.1.2.3:4000");
        let moved = ValueEntity::new(after, after, key, value("v2"), false);
        assert!(!db.store(moved.clone()).unwrap());
        assert_eq!(db.values_per_address(&moved).unwrap(), 1);

        let kept = db.get(&key).unwrap().unwrap();
        assert_eq!(kept.get(&DhtKey::hash_string("mover")).unwrap().value(), &value("v1"));
    }

    #[test]
    fn test_moving_creator_is_charged_at_new_network() {
        let mut config = DhtConfig::default().with_creator_validation(false);
        config.limit_values_per_address = false;
        config.max_values_per_network = 1;
        let db = Database::with_config(&config);
        let key = DhtKey::hash(b"key");

        let resident = contact("resident", "82.1.2.3:4000");
        assert!(db.store(ValueEntity::new(resident, resident, key, value("v"), false)).unwrap());

        let before = contact("mover", "90.9.9.9:4000");
        assert!(db.store(ValueEntity::new(before, before, key, value("v1"), false)).unwrap());

        // Moving within its own /24 stays allowed, moving into the full one does not
        let nearby = contact("mover", "90.9.9.77:4000");
        assert!(db.store(ValueEntity::new(nearby, nearby, key, value("v2"), false)).unwrap());

        let after = contact("mover", "82.1.2.50:4000");
        let moved = ValueEntity::new(after, after, key, value("v3"), false);
        assert!(!db.store(moved.clone()).unwrap());
        assert_eq!(db.values_per_network(&moved).unwrap(), 1);
    }

    #[test]
    fn test_local_values_are_not_flood_limited() {
        let mut config = DhtConfig::default();
        config.max_values_per_address = 1;
        let db = Database::with_config(&config);
        let me = contact("me", "82.1.2.3:4000");

        for i in 0..3 {
            let key = DhtKey::hash(format!("key{}", i).as_bytes());
            assert!(db.store(ValueEntity::local(me, key, value("mine"))).unwrap());
        }
        assert_eq!(db.value_count().unwrap(), 3);
    }

    #[test]
    fn test_indirect_private_creator_rejected() {
        let db = Database::with_config(&DhtConfig::default());
        let key = DhtKey::hash(b"key");
        let sender = contact("sender", "82.1.2.3:4000");

        let private = contact("private", "192.168.0.10:4000");
        assert!(!db.store(ValueEntity::new(private, sender, key, value("v"), false)).unwrap());

        let unspecified = contact("nobody", "0.0.0.0:4000");
        assert!(!db.store(ValueEntity::new(unspecified, sender, key, value("v"), false)).unwrap());

        let public = contact("public", "82.9.9.9:4000");
        assert!(db.store(ValueEntity::new(public, sender, key, value("v"), false)).unwrap());
    }

    #[test]
    fn test_request_load() {
        let db = Database::new();
        let key = DhtKey::hash(b"key");

        assert_eq!(db.request_load(&key, true).unwrap(), 0.0);

        db.store(entity(key, "alice", "a")).unwrap();
        assert_eq!(db.request_load(&key, true).unwrap(), 0.0);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let load = db.request_load(&key, true).unwrap();
        assert!(load > 0.0);
        assert_eq!(db.request_load(&key, false).unwrap(), load);
    }

    #[test]
    fn test_retain_removes_and_updates_counts() {
        let db = Database::new();
        let k1 = DhtKey::hash(b"k1");
        let k2 = DhtKey::hash(b"k2");
        db.store(entity(k1, "alice", "keep")).unwrap();
        db.store(entity(k1, "bob", "drop")).unwrap();
        db.store(entity(k2, "bob", "drop")).unwrap();

        let removed = db.retain(|e| e.value().payload() != b"drop").unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(db.stats().unwrap(), DatabaseStats { keys: 1, values: 1 });
        assert!(db.contains(&k1, &DhtKey::hash_string("alice")).unwrap());
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let db = Database::new();
        let mut handles = vec![];

        for i in 0..10 {
            let db = db.clone();
            handles.push(thread::spawn(move || {
                let key = DhtKey::hash(format!("key{}", i % 3).as_bytes());
                db.store(entity(key, &format!("node{}", i), "v")).unwrap();
            }));
        }

        let cleaner = {
            let db = db.clone();
            thread::spawn(move || {
                for _ in 0..10 {
                    db.retain(|_| true).unwrap();
                }
            })
        };

        for handle in handles {
            handle.join().unwrap();
        }
        cleaner.join().unwrap();

        assert_eq!(db.value_count().unwrap(), 10);
        assert_eq!(db.key_count().unwrap(), 3);
        assert_eq!(db.values().unwrap().len(), 10);
    }
}
