/*
    Storable - a value this node owns and keeps alive in the network

    Models create storables once and share them with the publisher, which
    stamps the publish time and replica count after every successful store.
*/

use std::sync::Mutex;
use std::time::SystemTime;

use super::contact::Contact;
use super::dht_key::DhtKey;
use super::dht_value::DhtValue;

#[derive(Debug, Clone, Copy, Default)]
struct PublishState {
    publish_time: Option<SystemTime>,
    location_count: usize,
}

#[derive(Debug)]
pub struct Storable {
    primary_key: DhtKey,
    value: DhtValue,
    state: Mutex<PublishState>,
}

impl Storable {
    pub fn new(primary_key: DhtKey, value: DhtValue) -> Self {
        Storable { primary_key, value, state: Mutex::new(PublishState::default()) }
    }

    pub fn primary_key(&self) -> &DhtKey {
        &self.primary_key
    }

    pub fn value(&self) -> &DhtValue {
        &self.value
    }

    /// When the value was last stored successfully, `None` if never
    pub fn publish_time(&self) -> Option<SystemTime> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).publish_time
    }

    /// Number of contacts that accepted the last successful store
    pub fn location_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).location_count
    }

    /// Record a successful store at `now`
    pub fn mark_published(&self, now: SystemTime, location_count: usize) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.publish_time = Some(now);
        state.location_count = location_count;
    }
}

/// Outcome of storing one value into the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResult {
    pub primary_key: DhtKey,
    /// Contacts that accepted the value
    pub locations: Vec<Contact>,
    /// Contacts that were asked but did not accept it
    pub failed: Vec<Contact>,
}

impl StoreResult {
    pub fn new(primary_key: DhtKey, locations: Vec<Contact>) -> Self {
        StoreResult { primary_key, locations, failed: Vec::new() }
    }

    pub fn with_failed(mut self, failed: Vec<Contact>) -> Self {
        self.failed = failed;
        self
    }

    pub fn location_count(&self) -> usize {
        self.locations.len()
    }
}
