/*
    ValueEntity - a value as held by the database

    An entity binds a value to the key it is stored under and to the contacts
    that created and delivered it. Identity is the pair (primary key,
    secondary key); the secondary key is always the creator's node id.
*/

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

use super::contact::Contact;
use super::dht_key::DhtKey;
use super::dht_value::DhtValue;
use super::storable::Storable;

#[derive(Debug, Clone)]
pub struct ValueEntity {
    creator: Contact,
    sender: Contact,
    primary_key: DhtKey,
    value: DhtValue,
    creation_time: SystemTime,
    local: bool,
}

impl ValueEntity {
    /// An entity received from `sender` on behalf of `creator`
    pub fn new(
        creator: Contact,
        sender: Contact,
        primary_key: DhtKey,
        value: DhtValue,
        local: bool,
    ) -> Self {
        Self::with_creation_time(creator, sender, primary_key, value, local, SystemTime::now())
    }

    pub fn with_creation_time(
        creator: Contact,
        sender: Contact,
        primary_key: DhtKey,
        value: DhtValue,
        local: bool,
        creation_time: SystemTime,
    ) -> Self {
        ValueEntity { creator, sender, primary_key, value, creation_time, local }
    }

    /// An entity this node originates itself
    pub fn local(local_contact: Contact, primary_key: DhtKey, value: DhtValue) -> Self {
        Self::new(local_contact, local_contact, primary_key, value, true)
    }

    /// The entity the publisher stores for `storable`
    pub fn from_storable(local_contact: Contact, storable: &Storable) -> Self {
        Self::local(local_contact, *storable.primary_key(), storable.value().clone())
    }

    pub fn creator(&self) -> &Contact {
        &self.creator
    }

    pub fn sender(&self) -> &Contact {
        &self.sender
    }

    pub fn primary_key(&self) -> &DhtKey {
        &self.primary_key
    }

    pub fn secondary_key(&self) -> &DhtKey {
        &self.creator.node_id
    }

    pub fn value(&self) -> &DhtValue {
        &self.value
    }

    pub fn creation_time(&self) -> SystemTime {
        self.creation_time
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Whether the creator delivered the value itself
    pub fn is_direct(&self) -> bool {
        self.creator.node_id == self.sender.node_id
    }
}

impl PartialEq for ValueEntity {
    fn eq(&self, other: &Self) -> bool {
        self.primary_key == other.primary_key && self.secondary_key() == other.secondary_key()
    }
}

impl Eq for ValueEntity {}

impl Hash for ValueEntity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.primary_key.hash(state);
        self.secondary_key().hash(state);
    }
}

impl fmt::Display for ValueEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} from {} ({}{}): {}",
            self.primary_key,
            self.secondary_key(),
            self.sender,
            if self.local { "local" } else { "remote" },
            if self.is_direct() { ", direct" } else { "" },
            self.value
        )
    }
}
