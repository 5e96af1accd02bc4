pub mod admission;
pub mod bag;
pub mod contact;
pub mod database_cleaner;
pub mod dht_config;
pub mod dht_key;
pub mod dht_node;
pub mod dht_storage;
pub mod dht_value;
pub mod errors;
pub mod evictor;
pub mod network;
pub mod replication;
pub mod routing_table;
pub mod scheduler;
pub mod storable;
pub mod storable_model;
pub mod value_entity;
pub mod value_factory;
pub mod value_type;

pub use admission::{AdmissionPolicy, DefaultAdmissionPolicy};
pub use bag::{RequestLoadParams, ValueEntityBag};
pub use contact::Contact;
pub use database_cleaner::DatabaseCleaner;
pub use dht_config::DhtConfig;
pub use dht_key::DhtKey;
pub use dht_node::DhtContext;
pub use dht_storage::{Database, DatabaseLimits, DatabaseStats, DatabaseView};
pub use dht_value::{DhtValue, Version};
pub use errors::{DhtError, DhtResult};
pub use evictor::{DefaultEvictor, Evictor, EvictorRegistry};
pub use network::NetworkFacade;
pub use replication::{PublisherState, StorablePublisher};
pub use routing_table::RoutingTable;
pub use scheduler::{ScheduledTask, Scheduler};
pub use storable::{Storable, StoreResult};
pub use storable_model::{SimpleStorableModel, StorableModel, StorableModelRegistry};
pub use value_entity::ValueEntity;
pub use value_factory::{DefaultValueFactory, TextValueFactory, ValueFactory, ValueFactoryRegistry};
pub use value_type::{ValueType, ValueTypeRegistry};
