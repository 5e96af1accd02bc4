//! Fakes for the collaborators the storage subsystem consumes
//!
//! `FakeNetwork` records every store and, in manual mode, keeps it pending
//! until the test completes it. That makes the order and number of
//! outstanding stores observable.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use tokio::sync::oneshot;

use super::fixtures::{contact, contacts};
use crate::core_dht::{
    Contact, DhtError, DhtKey, DhtResult, NetworkFacade, RoutingTable, StoreResult, ValueEntity,
};

/// Routing table over a fixed set of contacts
pub struct FakeRoutingTable {
    local: Contact,
    contacts: RwLock<Vec<Contact>>,
}

impl FakeRoutingTable {
    pub fn new(local: Contact) -> Self {
        FakeRoutingTable { local, contacts: RwLock::new(vec![local]) }
    }

    pub fn with_random_local() -> Self {
        Self::new(contact(&DhtKey::random().to_hex()))
    }

    pub fn add(&self, contact: Contact) {
        self.contacts.write().unwrap().push(contact);
    }
}

impl RoutingTable for FakeRoutingTable {
    fn local_node(&self) -> Contact {
        self.local
    }

    fn select(&self, key: &DhtKey, count: usize) -> Vec<Contact> {
        let mut contacts = self.contacts.read().unwrap().clone();
        contacts.sort_by_key(|c| c.node_id.distance(key));
        contacts.truncate(count);
        contacts
    }
}

/// How `FakeNetwork` answers stores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Stores stay pending until completed by the test
    Manual,
    /// Stores succeed at once with this many locations
    Succeed(usize),
    /// Stores fail at once
    Fail,
}

type PendingStore = (DhtKey, oneshot::Sender<DhtResult<StoreResult>>);

pub struct FakeNetwork {
    local: Contact,
    bootstrapped: AtomicBool,
    bootstrapping: AtomicBool,
    mode: Mutex<StoreMode>,
    calls: Mutex<Vec<ValueEntity>>,
    pending: Mutex<VecDeque<PendingStore>>,
}

impl FakeNetwork {
    /// A bootstrapped node in manual mode
    pub fn new() -> Self {
        Self::with_local(contact("local-node"))
    }

    pub fn with_local(local: Contact) -> Self {
        FakeNetwork {
            local,
            bootstrapped: AtomicBool::new(true),
            bootstrapping: AtomicBool::new(false),
            mode: Mutex::new(StoreMode::Manual),
            calls: Mutex::new(Vec::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn set_bootstrapped(&self, bootstrapped: bool) {
        self.bootstrapped.store(bootstrapped, Ordering::SeqCst);
    }

    pub fn set_bootstrapping(&self, bootstrapping: bool) {
        self.bootstrapping.store(bootstrapping, Ordering::SeqCst);
    }

    pub fn set_mode(&self, mode: StoreMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_auto_succeed(&self, locations: usize) {
        self.set_mode(StoreMode::Succeed(locations));
    }

    /// Every entity passed to `store`, in call order
    pub fn calls(&self) -> Vec<ValueEntity> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Stores still awaited by their caller
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().iter().filter(|(_, tx)| !tx.is_closed()).count()
    }

    /// Complete the oldest store still awaited by its caller, building the
    /// result from its key. Returns false if there was none.
    pub fn complete_next_with<F>(&self, result: F) -> bool
    where
        F: FnOnce(DhtKey) -> DhtResult<StoreResult>,
    {
        let next = {
            let mut pending = self.pending.lock().unwrap();
            loop {
                match pending.pop_front() {
                    Some((_, tx)) if tx.is_closed() => continue,
                    other => break other,
                }
            }
        };
        match next {
            Some((key, tx)) => tx.send(result(key)).is_ok(),
            None => false,
        }
    }

    pub fn complete_next(&self, result: DhtResult<StoreResult>) -> bool {
        self.complete_next_with(|_| result)
    }

    /// Complete the oldest pending store with `locations` accepting contacts
    pub fn succeed_next(&self, locations: usize) -> bool {
        self.complete_next_with(|key| Ok(StoreResult::new(key, contacts(locations))))
    }

    pub fn fail_next(&self) -> bool {
        self.complete_next(Err(DhtError::Store("fake network failure".to_string())))
    }
}

impl Default for FakeNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkFacade for FakeNetwork {
    fn local_contact(&self) -> Contact {
        self.local
    }

    fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    fn is_bootstrapping(&self) -> bool {
        self.bootstrapping.load(Ordering::SeqCst)
    }

    async fn store(&self, entity: ValueEntity) -> DhtResult<StoreResult> {
        let key = *entity.primary_key();
        self.calls.lock().unwrap().push(entity);

        let mode = *self.mode.lock().unwrap();
        match mode {
            StoreMode::Succeed(locations) => Ok(StoreResult::new(key, contacts(locations))),
            StoreMode::Fail => Err(DhtError::Store("fake network failure".to_string())),
            StoreMode::Manual => {
                let (tx, rx) = oneshot::channel();
                self.pending.lock().unwrap().push_back((key, tx));
                rx.await.unwrap_or(Err(DhtError::Cancelled))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{remote_entity, wait_until, DEFAULT_TEST_TIMEOUT};

    #[test]
    fn test_routing_table_orders_by_distance() {
        let table = FakeRoutingTable::with_random_local();
        for c in contacts(10) {
            table.add(c);
        }

        let key = DhtKey::hash(b"target");
        let selected = table.select(&key, 4);
        assert_eq!(selected.len(), 4);
        for pair in selected.windows(2) {
            assert!(pair[0].node_id.distance(&key) <= pair[1].node_id.distance(&key));
        }
    }

    #[tokio::test]
    async fn test_manual_store_completes() {
        let network = std::sync::Arc::new(FakeNetwork::new());
        let caller = network.clone();
        let store = tokio::spawn(async move { caller.store(remote_entity("k", "a", "v")).await });

        assert!(wait_until(DEFAULT_TEST_TIMEOUT, || network.pending_count() == 1).await);
        assert!(network.succeed_next(3));

        let result = store.await.unwrap().unwrap();
        assert_eq!(result.location_count(), 3);
        assert_eq!(network.call_count(), 1);
    }

    #[tokio::test]
    async fn test_auto_modes() {
        let network = FakeNetwork::new();
        network.set_auto_succeed(2);
        let ok = network.store(remote_entity("k", "a", "v")).await.unwrap();
        assert_eq!(ok.location_count(), 2);

        network.set_mode(StoreMode::Fail);
        assert!(network.store(remote_entity("k", "a", "v")).await.is_err());
        assert_eq!(network.call_count(), 2);
    }
}
