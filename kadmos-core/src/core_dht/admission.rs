/*
    Admission - pluggable store admission policies

    The database asks the installed policy before inserting a non-empty
    entity. A rejection is silent: `Database::store` returns false and
    nothing is inserted. Policies see the store through a `DatabaseView` of
    the already locked state, so they must not (and cannot) call back into
    the database.
*/

use tracing::trace;

use super::bag::ValueEntityBag;
use super::dht_storage::DatabaseView;
use super::value_entity::ValueEntity;

pub trait AdmissionPolicy: Send + Sync {
    /// Decide whether `entity` may be stored. `bag` holds the entities
    /// currently stored under the same primary key, if any.
    fn allow_store(
        &self,
        view: &DatabaseView<'_>,
        bag: Option<&ValueEntityBag>,
        entity: &ValueEntity,
    ) -> bool;
}

/// Bag size limit plus "only the creator may replace its value"
#[derive(Debug, Clone)]
pub struct DefaultAdmissionPolicy {
    max_values_per_key: usize,
}

impl DefaultAdmissionPolicy {
    pub fn new(max_values_per_key: usize) -> Self {
        DefaultAdmissionPolicy { max_values_per_key }
    }
}

impl Default for DefaultAdmissionPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

impl AdmissionPolicy for DefaultAdmissionPolicy {
    fn allow_store(
        &self,
        _view: &DatabaseView<'_>,
        bag: Option<&ValueEntityBag>,
        entity: &ValueEntity,
    ) -> bool {
        if entity.is_local() {
            return true;
        }

        let Some(bag) = bag else {
            return true;
        };

        match bag.get(entity.secondary_key()) {
            None => {
                let allowed = bag.len() < self.max_values_per_key;
                if !allowed {
                    trace!(key = %entity.primary_key(), size = bag.len(), "Bag is full");
                }
                allowed
            }
            Some(existing) if existing.is_local() => {
                trace!(key = %entity.primary_key(), "Remote value may not replace a local one");
                false
            }
            Some(existing) => existing.creator().address == entity.creator().address,
        }
    }
}
