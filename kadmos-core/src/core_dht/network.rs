/*
    NetworkFacade - what the storage subsystem needs from the running node

    The publisher only needs to know whether the node has joined the
    overlay and a way to store one entity at the k closest nodes.
*/

use async_trait::async_trait;

use super::contact::Contact;
use super::errors::DhtResult;
use super::storable::StoreResult;
use super::value_entity::ValueEntity;

#[async_trait]
pub trait NetworkFacade: Send + Sync {
    /// This node's current contact
    fn local_contact(&self) -> Contact;

    /// The node completed its initial bootstrap
    fn is_bootstrapped(&self) -> bool;

    /// A bootstrap is in progress
    fn is_bootstrapping(&self) -> bool;

    /// Store `entity` at the nodes closest to its primary key
    async fn store(&self, entity: ValueEntity) -> DhtResult<StoreResult>;
}
