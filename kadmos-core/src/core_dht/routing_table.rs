/*
    RoutingTable - the view of the overlay consumed by evictors

    Responsibilities:
    `routing_table.rs` defines the part of the Kademlia routing table the
    storage subsystem depends on. Bucket maintenance and lookups live with
    the routing layer itself.

    Outputs:
    - this node's own contact
    - the closest known contacts for a key
*/

use super::contact::Contact;
use super::dht_key::DhtKey;

pub trait RoutingTable: Send + Sync {
    /// This node's own contact
    fn local_node(&self) -> Contact;

    /// Up to `count` known contacts closest to `key` by XOR distance,
    /// closest first. May include the local node.
    fn select(&self, key: &DhtKey, count: usize) -> Vec<Contact>;
}
