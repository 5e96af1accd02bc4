/*
    DhtContext - the storage subsystem of one DHT node

    Responsibilities:
    `dht_node.rs` builds and owns every per-node registry and background
    task: value types and factories, evictors, storable models, the
    database, the database cleaner and the storable publisher. Components
    receive the registries they need from here, nothing is process-global.

    Inputs:
    - configuration
    - the node's network facade and routing table
    - identity and address change notifications

    Outputs:
    - access to the registries and the database
    - lifecycle of the background tasks
*/

use std::sync::Arc;
use tracing::info;

use super::admission::DefaultAdmissionPolicy;
use super::database_cleaner::DatabaseCleaner;
use super::dht_config::DhtConfig;
use super::dht_storage::Database;
use super::errors::{DhtError, DhtResult};
use super::evictor::EvictorRegistry;
use super::network::NetworkFacade;
use super::replication::StorablePublisher;
use super::routing_table::RoutingTable;
use super::scheduler::Scheduler;
use super::storable_model::StorableModelRegistry;
use super::value_factory::ValueFactoryRegistry;
use super::value_type::ValueTypeRegistry;

pub struct DhtContext {
    config: DhtConfig,
    value_types: Arc<ValueTypeRegistry>,
    value_factories: Arc<ValueFactoryRegistry>,
    evictors: Arc<EvictorRegistry>,
    models: Arc<StorableModelRegistry>,
    database: Database,
    network: Arc<dyn NetworkFacade>,
    routing_table: Arc<dyn RoutingTable>,
    cleaner: DatabaseCleaner,
    publisher: StorablePublisher,
}

impl DhtContext {
    pub fn new(
        config: DhtConfig,
        network: Arc<dyn NetworkFacade>,
        routing_table: Arc<dyn RoutingTable>,
        scheduler: Scheduler,
    ) -> DhtResult<Self> {
        config.validate().map_err(|e| DhtError::Precondition(e.to_string()))?;

        let value_types = Arc::new(ValueTypeRegistry::new(config.value_type_cache_size));
        let value_factories = Arc::new(ValueFactoryRegistry::new());
        let evictors = Arc::new(EvictorRegistry::from_config(&config));
        let models = Arc::new(StorableModelRegistry::new());

        let database = Database::with_config(&config);
        database.set_admission_policy(Some(Arc::new(DefaultAdmissionPolicy::new(
            config.max_values_per_key,
        ))));

        let cleaner = DatabaseCleaner::new(
            database.clone(),
            evictors.clone(),
            routing_table.clone(),
            scheduler.clone(),
            config.cleaner_initial_delay,
            config.cleaner_period,
        );
        let publisher = StorablePublisher::new(
            network.clone(),
            models.clone(),
            scheduler,
            config.publisher_initial_delay,
            config.publisher_period,
        );

        Ok(DhtContext {
            config,
            value_types,
            value_factories,
            evictors,
            models,
            database,
            network,
            routing_table,
            cleaner,
            publisher,
        })
    }

    pub fn config(&self) -> &DhtConfig {
        &self.config
    }

    pub fn value_types(&self) -> &Arc<ValueTypeRegistry> {
        &self.value_types
    }

    pub fn value_factories(&self) -> &Arc<ValueFactoryRegistry> {
        &self.value_factories
    }

    pub fn evictors(&self) -> &Arc<EvictorRegistry> {
        &self.evictors
    }

    pub fn models(&self) -> &Arc<StorableModelRegistry> {
        &self.models
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn network(&self) -> &Arc<dyn NetworkFacade> {
        &self.network
    }

    pub fn routing_table(&self) -> &Arc<dyn RoutingTable> {
        &self.routing_table
    }

    pub fn cleaner(&self) -> &DatabaseCleaner {
        &self.cleaner
    }

    pub fn publisher(&self) -> &StorablePublisher {
        &self.publisher
    }

    /// Start the database cleaner and the storable publisher
    pub fn start(&self) {
        info!(node = %self.network.local_contact(), "Starting DHT storage");
        self.cleaner.start();
        self.publisher.start();
    }

    pub fn stop(&self) {
        info!(node = %self.network.local_contact(), "Stopping DHT storage");
        self.publisher.stop();
        self.cleaner.stop();
    }

    pub fn is_running(&self) -> bool {
        self.cleaner.is_running() || self.publisher.is_running()
    }

    /// The node took a new identity: values stored under the old one are
    /// dropped and models regenerate theirs.
    pub fn change_identity(&self) -> DhtResult<()> {
        info!(node = %self.network.local_contact(), "Node identity changed, purging database");
        self.database.clear()?;
        self.models.notify_contact_change();
        Ok(())
    }

    /// The node's external address changed. Stored values remain valid.
    pub fn external_address_changed(&self) {
        info!(node = %self.network.local_contact(), "External address changed");
        self.models.notify_contact_change();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_dht::dht_key::DhtKey;
    use crate::core_dht::storable_model::SimpleStorableModel;
    use crate::core_dht::value_entity::ValueEntity;
    use crate::core_dht::value_type::ValueType;
    use crate::test_utils::{remote_entity, FakeNetwork, FakeRoutingTable};

    fn context(config: DhtConfig) -> DhtResult<DhtContext> {
        let network = Arc::new(FakeNetwork::new());
        let routing_table = Arc::new(FakeRoutingTable::new(network.local_contact()));
        DhtContext::new(config, network, routing_table, Scheduler::current())
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = context(DhtConfig::default().with_replication_parameter(0));
        assert!(matches!(result, Err(DhtError::Precondition(_))));
    }

    #[tokio::test]
    async fn test_start_stop() {
        let ctx = context(DhtConfig::test_config()).unwrap();
        assert!(!ctx.is_running());
        ctx.start();
        assert!(ctx.is_running());
        ctx.stop();
        assert!(!ctx.is_running());
    }

    #[tokio::test]
    async fn test_admission_policy_installed() {
        let mut config = DhtConfig::test_config();
        config.max_values_per_key = 1;
        let ctx = context(config).unwrap();

        assert!(ctx.database().store(remote_entity("key", "alice", "a")).unwrap());
        assert!(!ctx.database().store(remote_entity("key", "bob", "b")).unwrap());
    }

    #[tokio::test]
    async fn test_change_identity_purges_and_notifies() {
        let ctx = context(DhtConfig::test_config()).unwrap();
        let model = Arc::new(SimpleStorableModel::new());
        ctx.models().register(ValueType::test(), model.clone()).unwrap();

        let local = ctx.network().local_contact();
        let remote = remote_entity("key", "alice", "a");
        let mine = ValueEntity::local(local, DhtKey::hash_string("mine"), remote.value().clone());
        ctx.database().store(remote).unwrap();
        ctx.database().store(mine).unwrap();
        assert_eq!(ctx.database().value_count().unwrap(), 2);

        ctx.change_identity().unwrap();
        assert_eq!(ctx.database().value_count().unwrap(), 0);
        assert_eq!(model.contact_changes(), 1);
    }

    #[tokio::test]
    async fn test_address_change_keeps_database() {
        let ctx = context(DhtConfig::test_config()).unwrap();
        let model = Arc::new(SimpleStorableModel::new());
        ctx.models().register(ValueType::test(), model.clone()).unwrap();
        ctx.database().store(remote_entity("key", "alice", "a")).unwrap();

        ctx.external_address_changed();
        assert_eq!(ctx.database().value_count().unwrap(), 1);
        assert_eq!(model.contact_changes(), 1);
    }
}
