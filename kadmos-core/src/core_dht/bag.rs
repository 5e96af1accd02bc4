/*
    ValueEntityBag - all entities stored under one primary key

    Entities are keyed by secondary key (creator id), so a creator holds at
    most one value per key. The bag also tracks how often the key is
    requested, as an exponential moving average of the request rate.
*/

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::dht_key::DhtKey;
use super::value_entity::ValueEntity;

/// Shortest gap between two requests used for the rate sample
const MIN_REQUEST_GAP_SECS: f32 = 0.001;

/// Parameters of the request load average
#[derive(Debug, Clone, Copy)]
pub struct RequestLoadParams {
    pub smoothing: f32,
    pub nulling_delay: Duration,
}

impl Default for RequestLoadParams {
    fn default() -> Self {
        RequestLoadParams { smoothing: 0.25, nulling_delay: Duration::from_secs(60) }
    }
}

#[derive(Debug, Clone)]
pub struct ValueEntityBag {
    primary_key: DhtKey,
    entities: HashMap<DhtKey, ValueEntity>,
    request_load: f32,
    last_request: Option<Instant>,
}

impl ValueEntityBag {
    pub fn new(primary_key: DhtKey) -> Self {
        ValueEntityBag {
            primary_key,
            entities: HashMap::new(),
            request_load: 0.0,
            last_request: None,
        }
    }

    pub fn primary_key(&self) -> &DhtKey {
        &self.primary_key
    }

    pub fn get(&self, secondary_key: &DhtKey) -> Option<&ValueEntity> {
        self.entities.get(secondary_key)
    }

    pub fn contains(&self, secondary_key: &DhtKey) -> bool {
        self.entities.contains_key(secondary_key)
    }

    /// Insert or replace the creator's entity, returning the replaced one
    pub(crate) fn put(&mut self, entity: ValueEntity) -> Option<ValueEntity> {
        debug_assert_eq!(entity.primary_key(), &self.primary_key);
        self.entities.insert(*entity.secondary_key(), entity)
    }

    pub(crate) fn remove(&mut self, secondary_key: &DhtKey) -> Option<ValueEntity> {
        self.entities.remove(secondary_key)
    }

    pub(crate) fn retain<F>(&mut self, mut keep: F) -> Vec<ValueEntity>
    where
        F: FnMut(&ValueEntity) -> bool,
    {
        let expired: Vec<DhtKey> =
            self.entities.iter().filter(|(_, e)| !keep(*e)).map(|(k, _)| *k).collect();
        expired.iter().filter_map(|k| self.entities.remove(k)).collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = &ValueEntity> {
        self.entities.values()
    }

    pub fn secondary_keys(&self) -> impl Iterator<Item = &DhtKey> {
        self.entities.keys()
    }

    /// Current request load, optionally counting a request made at `now`
    pub(crate) fn request_load(
        &mut self,
        increment: bool,
        now: Instant,
        params: RequestLoadParams,
    ) -> f32 {
        if let Some(last) = self.last_request {
            let gap = now.saturating_duration_since(last);
            if gap > params.nulling_delay {
                self.request_load = 0.0;
            }

            if increment {
                let secs = gap.as_secs_f32().max(MIN_REQUEST_GAP_SECS);
                self.request_load =
                    params.smoothing * (1.0 / secs) + (1.0 - params.smoothing) * self.request_load;
            }
        }

        if increment {
            self.last_request = Some(now);
        }
        self.request_load
    }
}
