/*
    Loopback - an in-process overlay for the demo command

    Every peer is a plain database. Stores from the local node go to the k
    peers closest to the key, the way a real node would deliver them after
    a lookup.
*/

use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kadmos_core::core_dht::{
    Contact, Database, DefaultAdmissionPolicy, DhtConfig, DhtError, DhtKey, DhtResult,
    NetworkFacade, RoutingTable, StoreResult, ValueEntity,
};
use tracing::trace;

pub struct Peer {
    pub contact: Contact,
    pub database: Database,
}

fn peer_contact(index: usize) -> Contact {
    let node_id = DhtKey::hash_string(&format!("loopback-peer-{}", index));
    let ip = Ipv4Addr::new(82, 10, (index / 250) as u8, (index % 250) as u8 + 1);
    Contact::new(node_id, SocketAddr::new(IpAddr::V4(ip), 4000))
}

pub struct LoopbackNetwork {
    local: Contact,
    peers: Vec<Peer>,
    replication: usize,
    bootstrapped: AtomicBool,
}

impl LoopbackNetwork {
    pub fn new(peer_count: usize, config: &DhtConfig) -> Self {
        let peers = (0..peer_count)
            .map(|i| {
                let database = Database::with_config(config);
                database.set_admission_policy(Some(Arc::new(DefaultAdmissionPolicy::new(
                    config.max_values_per_key,
                ))));
                Peer { contact: peer_contact(i), database }
            })
            .collect();

        LoopbackNetwork {
            local: Contact::new(
                DhtKey::hash_string("loopback-local"),
                SocketAddr::new(IpAddr::V4(Ipv4Addr::new(82, 9, 0, 1)), 4000),
            ),
            peers,
            replication: config.replication_parameter,
            bootstrapped: AtomicBool::new(true),
        }
    }

    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn set_bootstrapped(&self, bootstrapped: bool) {
        self.bootstrapped.store(bootstrapped, Ordering::SeqCst);
    }

    fn closest(&self, key: &DhtKey, count: usize) -> Vec<&Peer> {
        let mut peers: Vec<&Peer> = self.peers.iter().collect();
        peers.sort_by_key(|p| p.contact.node_id.distance(key));
        peers.truncate(count);
        peers
    }
}

#[async_trait]
impl NetworkFacade for LoopbackNetwork {
    fn local_contact(&self) -> Contact {
        self.local
    }

    fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::SeqCst)
    }

    fn is_bootstrapping(&self) -> bool {
        false
    }

    async fn store(&self, entity: ValueEntity) -> DhtResult<StoreResult> {
        if !self.is_bootstrapped() {
            return Err(DhtError::NotBootstrapped);
        }
        let key = *entity.primary_key();
        let mut locations = Vec::new();
        let mut failed = Vec::new();

        // Peers hold the record on the publisher's behalf, never as their own
        let remote = ValueEntity::new(
            *entity.creator(),
            self.local,
            key,
            entity.value().clone(),
            false,
        );

        for peer in self.closest(&key, self.replication) {
            match peer.database.store(remote.clone()) {
                Ok(true) => locations.push(peer.contact),
                Ok(false) => failed.push(peer.contact),
                Err(e) => {
                    trace!(peer = %peer.contact, error = %e, "Peer store failed");
                    failed.push(peer.contact);
                }
            }
        }

        if locations.is_empty() {
            return Err(DhtError::Store(format!("no peer accepted {}", key)));
        }
        Ok(StoreResult::new(key, locations).with_failed(failed))
    }
}

impl RoutingTable for LoopbackNetwork {
    fn local_node(&self) -> Contact {
        self.local
    }

    fn select(&self, key: &DhtKey, count: usize) -> Vec<Contact> {
        let mut contacts: Vec<Contact> = self.peers.iter().map(|p| p.contact).collect();
        contacts.push(self.local);
        contacts.sort_by_key(|c| c.node_id.distance(key));
        contacts.truncate(count);
        contacts
    }
}
