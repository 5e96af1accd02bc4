/*
    Contact - a node identity paired with its contact address

    The creator and sender of every stored record are contacts. The creator's
    node id doubles as the record's secondary key; its address feeds the
    store's per-address flood limits.
*/

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::dht_key::DhtKey;

/// Netmask selecting a class C (/24) network
pub const CLASS_C_NETMASK: u32 = 0xFFFF_FF00;

/// Netmask selecting a single IPv4 address
pub const IPV4_ADDRESS_NETMASK: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub node_id: DhtKey,
    pub address: SocketAddr,
}

impl Contact {
    pub fn new(node_id: DhtKey, address: SocketAddr) -> Self {
        Contact { node_id, address }
    }

    /// A contact is reachable if its address is routable from the outside
    pub fn has_valid_address(&self) -> bool {
        self.address.port() != 0 && !self.address.ip().is_unspecified()
    }

    /// Private, loopback and link-local addresses
    pub fn has_private_address(&self) -> bool {
        match self.address.ip() {
            IpAddr::V4(ip) => ip.is_private() || ip.is_loopback() || ip.is_link_local(),
            IpAddr::V6(ip) => ip.is_loopback() || (ip.segments()[0] & 0xfe00) == 0xfc00,
        }
    }

    /// The IPv4 address masked with `netmask`, `None` for IPv6 contacts
    pub fn masked_ipv4(&self, netmask: u32) -> Option<u32> {
        match self.address.ip() {
            IpAddr::V4(ip) => Some(u32::from(ip) & netmask),
            IpAddr::V6(ip) => ip.to_ipv4_mapped().map(|v4: Ipv4Addr| u32::from(v4) & netmask),
        }
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.node_id, self.address)
    }
}
