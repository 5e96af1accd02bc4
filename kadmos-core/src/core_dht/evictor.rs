/*
    Evictor - expiration policies keyed by value type

    Responsibilities:
    `evictor.rs` decides when a stored value is stale. The database cleaner
    asks the registry for every stored entity; the registry delegates to
    the evictor bound to the entity's value type, or to the default one.

    The default policy:
    - values this node published itself never expire here, the publisher
      keeps them alive
    - remote values live for `value_expiration` after they were stored
    - remote values held by a node outside the k closest to the key expire
      sooner, the lifetime halving for every bucket of distance between the
      k-th closest contact and this node
*/

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use tracing::debug;

use super::dht_config::DhtConfig;
use super::errors::{DhtError, DhtResult};
use super::routing_table::RoutingTable;
use super::value_entity::ValueEntity;
use super::value_type::ValueType;

/// Upper bound on how many times a far replica's lifetime is halved
const MAX_LIFETIME_HALVINGS: usize = 8;

pub trait Evictor: Send + Sync {
    fn is_expired(&self, routing_table: &dyn RoutingTable, entity: &ValueEntity) -> bool;
}

#[derive(Debug, Clone)]
pub struct DefaultEvictor {
    replication_parameter: usize,
    value_expiration: Duration,
}

impl DefaultEvictor {
    pub fn new(replication_parameter: usize, value_expiration: Duration) -> Self {
        DefaultEvictor { replication_parameter, value_expiration }
    }

    pub fn from_config(config: &DhtConfig) -> Self {
        Self::new(config.replication_parameter, config.value_expiration)
    }

    /// How long `entity` may stay in this node's database
    pub fn lifetime(&self, routing_table: &dyn RoutingTable, entity: &ValueEntity) -> Duration {
        let key = entity.primary_key();
        let local = routing_table.local_node();
        let closest = routing_table.select(key, self.replication_parameter);

        if closest.len() < self.replication_parameter
            || closest.iter().any(|c| c.node_id == local.node_id)
        {
            return self.value_expiration;
        }

        let Some(furthest) = closest.last() else {
            return self.value_expiration;
        };

        let excess = local
            .node_id
            .bucket_index(key)
            .saturating_sub(furthest.node_id.bucket_index(key))
            .min(MAX_LIFETIME_HALVINGS);
        self.value_expiration / (1u32 << excess)
    }

    /// When `entity` expires, `None` for values that never do
    pub fn expiration_time(
        &self,
        routing_table: &dyn RoutingTable,
        entity: &ValueEntity,
    ) -> Option<SystemTime> {
        if entity.is_local() {
            return None;
        }
        entity.creation_time().checked_add(self.lifetime(routing_table, entity))
    }
}

impl Default for DefaultEvictor {
    fn default() -> Self {
        Self::from_config(&DhtConfig::default())
    }
}

impl Evictor for DefaultEvictor {
    fn is_expired(&self, routing_table: &dyn RoutingTable, entity: &ValueEntity) -> bool {
        self.expiration_time(routing_table, entity)
            .is_some_and(|expires| SystemTime::now() >= expires)
    }
}

/// Routes expiration checks to the evictor registered for the value type
pub struct EvictorRegistry {
    default_evictor: Arc<dyn Evictor>,
    evictors: RwLock<HashMap<ValueType, Arc<dyn Evictor>>>,
}

impl EvictorRegistry {
    pub fn new(default_evictor: Arc<dyn Evictor>) -> Self {
        EvictorRegistry { default_evictor, evictors: RwLock::new(HashMap::new()) }
    }

    pub fn from_config(config: &DhtConfig) -> Self {
        Self::new(Arc::new(DefaultEvictor::from_config(config)))
    }

    /// Register `evictor` for `value_type`, returning the evictor it replaced
    pub fn register(
        &self,
        value_type: ValueType,
        evictor: Arc<dyn Evictor>,
    ) -> DhtResult<Option<Arc<dyn Evictor>>> {
        if value_type.is_any() {
            return Err(DhtError::Precondition(
                "cannot register an evictor for the ANY type".to_string(),
            ));
        }

        debug!(value_type = %value_type, "Registering evictor");
        let mut evictors = self.evictors.write().map_err(|e| DhtError::lock("evictors", e))?;
        Ok(evictors.insert(value_type, evictor))
    }

    pub fn unregister(&self, value_type: &ValueType) -> DhtResult<Option<Arc<dyn Evictor>>> {
        let mut evictors = self.evictors.write().map_err(|e| DhtError::lock("evictors", e))?;
        Ok(evictors.remove(value_type))
    }

    /// The evictor for `value_type`, falling back to the default evictor
    pub fn evictor(&self, value_type: &ValueType) -> Arc<dyn Evictor> {
        let evictors = self.evictors.read().unwrap_or_else(|e| e.into_inner());
        evictors.get(value_type).cloned().unwrap_or_else(|| self.default_evictor.clone())
    }

    pub fn is_expired(&self, routing_table: &dyn RoutingTable, entity: &ValueEntity) -> bool {
        self.evictor(entity.value().value_type()).is_expired(routing_table, entity)
    }
}

impl Default for EvictorRegistry {
    fn default() -> Self {
        Self::new(Arc::new(DefaultEvictor::default()))
    }
}
