//! Record of the DNS servers last installed by the agent
//!
//! One record exists per agent and it is shared by every client: the last successful
//! install wins, and restoring hands the whole record to the platform adapter. There is
//! no per-session history for DNS.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Number of DNS slots kept per address family
pub const DNS_BACKUP_SLOTS: usize = 2;

/// DNS servers installed by the most recent successful install, per family
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsBackup {
    pub ipv4: [Option<Ipv4Addr>; DNS_BACKUP_SLOTS],
    pub ipv6: [Option<Ipv6Addr>; DNS_BACKUP_SLOTS],
}

impl DnsBackup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite both IPv4 slots with the servers just installed
    pub fn record_v4(&mut self, servers: &[Ipv4Addr]) {
        fill_slots(&mut self.ipv4, servers);
    }

    /// Overwrite both IPv6 slots with the servers just installed
    pub fn record_v6(&mut self, servers: &[Ipv6Addr]) {
        fill_slots(&mut self.ipv6, servers);
    }

    /// All recorded servers, IPv4 first
    pub fn servers(&self) -> Vec<IpAddr> {
        self.ipv4
            .iter()
            .flatten()
            .map(|a| IpAddr::V4(*a))
            .chain(self.ipv6.iter().flatten().map(|a| IpAddr::V6(*a)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4.iter().all(Option::is_none) && self.ipv6.iter().all(Option::is_none)
    }
}

fn fill_slots<A: Copy>(slots: &mut [Option<A>; DNS_BACKUP_SLOTS], servers: &[A]) {
    for (i, slot) in slots.iter_mut().enumerate() {
        *slot = servers.get(i).copied();
    }
}
