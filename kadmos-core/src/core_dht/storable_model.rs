/*
    StorableModel - sources of values this node keeps published

    Responsibilities:
    `storable_model.rs` lets subsystems that own values (one per value
    type) hand them to the publisher and hear back about the outcome.

    Inputs:
    - model registrations keyed by value type
    - store results from the publisher
    - identity or address changes of this node

    Outputs:
    - the snapshot of storables for one publish run
*/

use hashlink::LinkedHashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, trace, warn};

use super::dht_key::DhtKey;
use super::errors::{DhtError, DhtResult};
use super::storable::{Storable, StoreResult};
use super::value_type::ValueType;

pub trait StorableModel: Send + Sync {
    /// The values to publish in the next run.
    ///
    /// `None` means the model has nothing to offer right now. A `None`
    /// element ends the model's contribution: the elements after it are
    /// not published in this run.
    fn storables(&self) -> Option<Vec<Option<Arc<Storable>>>>;

    /// A storable of this model was stored successfully
    fn handle_store_result(&self, storable: &Arc<Storable>, result: &StoreResult);

    /// This node's identity or external address changed
    fn handle_contact_change(&self);
}

/// Models keyed by value type, in registration order
#[derive(Default)]
pub struct StorableModelRegistry {
    models: RwLock<LinkedHashMap<ValueType, Arc<dyn StorableModel>>>,
}

impl StorableModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` for `value_type`, returning the model it replaced
    pub fn register(
        &self,
        value_type: ValueType,
        model: Arc<dyn StorableModel>,
    ) -> DhtResult<Option<Arc<dyn StorableModel>>> {
        if value_type.is_any() {
            return Err(DhtError::Precondition(
                "cannot register a storable model for the ANY type".to_string(),
            ));
        }

        debug!(value_type = %value_type, "Registering storable model");
        let mut models = self.models.write().map_err(|e| DhtError::lock("models", e))?;
        Ok(models.insert(value_type, model))
    }

    pub fn unregister(&self, value_type: &ValueType) -> DhtResult<Option<Arc<dyn StorableModel>>> {
        let mut models = self.models.write().map_err(|e| DhtError::lock("models", e))?;
        Ok(models.remove(value_type))
    }

    pub fn model(&self, value_type: &ValueType) -> Option<Arc<dyn StorableModel>> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        models.get(value_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn registered(&self) -> Vec<(ValueType, Arc<dyn StorableModel>)> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        models.iter().map(|(t, m)| (t.clone(), m.clone())).collect()
    }

    /// Collect the storables of every registered model
    pub fn snapshot_storables(&self) -> Vec<Arc<Storable>> {
        let mut snapshot = Vec::new();

        for (value_type, model) in self.registered() {
            let Some(storables) = model.storables() else {
                debug!(value_type = %value_type, "Model returned no storables");
                continue;
            };

            let before = snapshot.len();
            for storable in storables {
                match storable {
                    Some(storable) => snapshot.push(storable),
                    None => {
                        warn!(value_type = %value_type, "Model returned a missing storable");
                        break;
                    }
                }
            }
            trace!(value_type = %value_type, count = snapshot.len() - before, "Collected storables");
        }

        snapshot
    }

    /// Hand a store result to the model owning the storable's type
    pub fn notify_store_result(&self, storable: &Arc<Storable>, result: &StoreResult) {
        if let Some(model) = self.model(storable.value().value_type()) {
            model.handle_store_result(storable, result);
        }
    }

    pub fn notify_contact_change(&self) {
        for (_, model) in self.registered() {
            model.handle_contact_change();
        }
    }
}

/// In-memory model over a fixed list of storables
#[derive(Default)]
pub struct SimpleStorableModel {
    storables: Mutex<Vec<Arc<Storable>>>,
    results: Mutex<HashMap<DhtKey, StoreResult>>,
    contact_changes: Mutex<usize>,
}

impl SimpleStorableModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, storable: Arc<Storable>) {
        self.storables.lock().unwrap_or_else(|e| e.into_inner()).push(storable);
    }

    /// Remove every storable published under `primary_key`
    pub fn remove(&self, primary_key: &DhtKey) -> usize {
        let mut storables = self.storables.lock().unwrap_or_else(|e| e.into_inner());
        let before = storables.len();
        storables.retain(|s| s.primary_key() != primary_key);
        before - storables.len()
    }

    pub fn clear(&self) {
        self.storables.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.storables.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The last store result received for `primary_key`
    pub fn last_result(&self, primary_key: &DhtKey) -> Option<StoreResult> {
        self.results.lock().unwrap_or_else(|e| e.into_inner()).get(primary_key).cloned()
    }

    pub fn contact_changes(&self) -> usize {
        *self.contact_changes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StorableModel for SimpleStorableModel {
    fn storables(&self) -> Option<Vec<Option<Arc<Storable>>>> {
        let storables = self.storables.lock().unwrap_or_else(|e| e.into_inner());
        Some(storables.iter().cloned().map(Some).collect())
    }

    fn handle_store_result(&self, storable: &Arc<Storable>, result: &StoreResult) {
        trace!(key = %storable.primary_key(), locations = result.location_count(), "Stored");
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        results.insert(*storable.primary_key(), result.clone());
    }

    fn handle_contact_change(&self) {
        *self.contact_changes.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}
