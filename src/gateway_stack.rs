//! Per-client stack of default gateway backups
//!
//! Each client session may back up the system default gateways before overriding them.
//! Backups are kept most-recent-first, like a stack: a client that backs up again moves
//! its entry to the head. A client normally restores in reverse order of backing up, but
//! restoring out of order is allowed; the caller is told whether its entry was the head
//! so it can warn about it.
//!
//! The stack owns its snapshots outright. Removing an entry that is no longer present is
//! a no-op, so a snapshot can never be unlinked twice.

use crate::types::{session_label, ClientSession, GatewayBinding};
use serde::Serialize;
use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, warn};

/// Maximum number of client apps expected to hold a backup at the same time
pub const MAX_CLIENT_APPS: usize = 32;

/// Default gateways saved for one client session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultGwSnapshot {
    /// Owning client session
    pub session: ClientSession,
    /// IPv4 default gateway at backup time
    pub v4: Option<GatewayBinding<Ipv4Addr>>,
    /// IPv6 default gateway at backup time
    pub v6: Option<GatewayBinding<Ipv6Addr>>,
    /// This client replaced the IPv4 default gateway; restore it on pop
    pub v4_installed: bool,
    /// This client replaced the IPv6 default gateway; restore it on pop
    pub v6_installed: bool,
}

impl DefaultGwSnapshot {
    /// Create an empty snapshot owned by `session`
    pub fn new(session: ClientSession) -> Self {
        Self {
            session,
            v4: None,
            v6: None,
            v4_installed: false,
            v6_installed: false,
        }
    }

    pub fn with_gateways(
        session: ClientSession,
        v4: Option<GatewayBinding<Ipv4Addr>>,
        v6: Option<GatewayBinding<Ipv6Addr>>,
    ) -> Self {
        Self {
            v4,
            v6,
            ..Self::new(session)
        }
    }
}

/// A snapshot taken off the stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoppedSnapshot {
    pub snapshot: DefaultGwSnapshot,
    /// Whether the snapshot was the most recent backup
    pub was_head: bool,
}

/// Most-recent-first stack of default gateway snapshots, one per session
#[derive(Debug)]
pub struct GatewayStack {
    entries: VecDeque<DefaultGwSnapshot>,
    capacity: usize,
}

impl GatewayStack {
    /// Create a stack with room reserved for `capacity` concurrent clients
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshots from most to least recent
    pub fn iter(&self) -> impl Iterator<Item = &DefaultGwSnapshot> {
        self.entries.iter()
    }

    fn position(&self, session: ClientSession) -> Option<usize> {
        self.entries.iter().position(|s| s.session == session)
    }

    /// Find the snapshot of `session`, and whether it sits at the head
    pub fn find(&self, session: ClientSession) -> Option<(&DefaultGwSnapshot, bool)> {
        let idx = self.position(session)?;
        debug!(
            "Found default GW config backup for session {} on a queue of {}",
            session_label(session),
            self.entries.len()
        );
        Some((&self.entries[idx], idx == 0))
    }

    /// Mutable variant of [`GatewayStack::find`]
    pub fn find_mut(&mut self, session: ClientSession) -> Option<(&mut DefaultGwSnapshot, bool)> {
        let idx = self.position(session)?;
        Some((&mut self.entries[idx], idx == 0))
    }

    /// Save `incoming` as the backup of its session and move it to the head.
    ///
    /// A session that already has a backup keeps each installed flag only if the
    /// gateway address and interface of that family are unchanged. A new backup
    /// always starts with both flags cleared.
    pub fn insert(&mut self, incoming: DefaultGwSnapshot) {
        let session = incoming.session;

        let mut archived = match self.position(session) {
            Some(idx) => {
                debug!(
                    "Default GW config backup for session {} found; it is{} recent",
                    session_label(session),
                    if idx == 0 { "" } else { " not" }
                );
                let mut archived = self.entries.remove(idx).unwrap_or_else(|| {
                    DefaultGwSnapshot::new(session)
                });
                archived.v4_installed = archived.v4_installed && archived.v4 == incoming.v4;
                archived.v6_installed = archived.v6_installed && archived.v6 == incoming.v6;
                archived
            }
            None => {
                if self.entries.len() >= self.capacity {
                    warn!(
                        "Default GW backup stack exceeds {} clients; growing",
                        self.capacity
                    );
                }
                debug!(
                    "New default GW config backup created for session {}",
                    session_label(session)
                );
                DefaultGwSnapshot::new(session)
            }
        };

        debug!(
            "Archived default GWs set? IPv4 {} IPv6 {}",
            archived.v4_installed, archived.v6_installed
        );
        archived.v4 = incoming.v4;
        archived.v6 = incoming.v6;

        self.entries.push_front(archived);
    }

    /// Unlink the snapshot of `session` from anywhere in the stack
    pub fn remove(&mut self, session: ClientSession) -> Option<DefaultGwSnapshot> {
        let idx = self.position(session)?;
        self.entries.remove(idx)
    }

    /// Take the snapshot of `session` off the stack for restoring
    pub fn pop(&mut self, session: ClientSession) -> Option<PoppedSnapshot> {
        let idx = self.position(session)?;
        let snapshot = self.entries.remove(idx)?;
        Some(PoppedSnapshot {
            snapshot,
            was_head: idx == 0,
        })
    }
}

impl Default for GatewayStack {
    fn default() -> Self {
        Self::with_capacity(MAX_CLIENT_APPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InterfaceName, SessionRef};

    fn v4(addr: &str, intf: &str) -> Option<GatewayBinding<Ipv4Addr>> {
        Some(GatewayBinding {
            address: addr.parse().unwrap(),
            interface: InterfaceName::new(intf).unwrap(),
        })
    }

    fn v6(addr: &str, intf: &str) -> Option<GatewayBinding<Ipv6Addr>> {
        Some(GatewayBinding {
            address: addr.parse().unwrap(),
            interface: InterfaceName::new(intf).unwrap(),
        })
    }

    const A: ClientSession = Some(SessionRef(1));
    const B: ClientSession = Some(SessionRef(2));

    #[test]
    fn test_insert_pushes_to_head() {
        let mut stack = GatewayStack::default();
        stack.insert(DefaultGwSnapshot::with_gateways(A, v4("10.0.0.1", "eth0"), None));
        stack.insert(DefaultGwSnapshot::with_gateways(B, v4("10.0.0.1", "eth0"), None));

        assert_eq!(stack.len(), 2);
        assert!(stack.find(B).unwrap().1);
        assert!(!stack.find(A).unwrap().1);
    }

    #[test]
    fn test_one_snapshot_per_session() {
        let mut stack = GatewayStack::default();
        stack.insert(DefaultGwSnapshot::with_gateways(A, v4("10.0.0.1", "eth0"), None));
        stack.insert(DefaultGwSnapshot::with_gateways(B, None, None));
        stack.insert(DefaultGwSnapshot::with_gateways(A, v4("10.0.0.2", "eth1"), None));

        assert_eq!(stack.len(), 2);
        assert_eq!(stack.iter().filter(|s| s.session == A).count(), 1);
        let (snapshot, is_head) = stack.find(A).unwrap();
        assert!(is_head);
        assert_eq!(snapshot.v4, v4("10.0.0.2", "eth1"));
    }

    #[test]
    fn test_new_snapshot_flags_cleared() {
        let mut stack = GatewayStack::default();
        let mut incoming = DefaultGwSnapshot::with_gateways(A, v4("10.0.0.1", "eth0"), None);
        incoming.v4_installed = true;
        incoming.v6_installed = true;
        stack.insert(incoming);

        let (snapshot, _) = stack.find(A).unwrap();
        assert!(!snapshot.v4_installed);
        assert!(!snapshot.v6_installed);
    }

    #[test]
    fn test_rebackup_keeps_flags_only_when_unchanged() {
        let mut stack = GatewayStack::default();
        stack.insert(DefaultGwSnapshot::with_gateways(
            A,
            v4("10.0.0.1", "eth0"),
            v6("fe80::1", "eth0"),
        ));
        {
            let (snapshot, _) = stack.find_mut(A).unwrap();
            snapshot.v4_installed = true;
            snapshot.v6_installed = true;
        }

        // Same IPv4 binding, IPv6 moved to another interface
        stack.insert(DefaultGwSnapshot::with_gateways(
            A,
            v4("10.0.0.1", "eth0"),
            v6("fe80::1", "wlan0"),
        ));

        let (snapshot, _) = stack.find(A).unwrap();
        assert!(snapshot.v4_installed);
        assert!(!snapshot.v6_installed);
        assert_eq!(snapshot.v6, v6("fe80::1", "wlan0"));
    }

    #[test]
    fn test_pop_reports_head() {
        let mut stack = GatewayStack::default();
        stack.insert(DefaultGwSnapshot::new(A));
        stack.insert(DefaultGwSnapshot::new(B));

        let popped = stack.pop(A).unwrap();
        assert!(!popped.was_head);
        assert_eq!(popped.snapshot.session, A);
        assert!(stack.find(B).is_some());
        assert!(stack.pop(A).is_none());

        let popped = stack.pop(B).unwrap();
        assert!(popped.was_head);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut stack = GatewayStack::default();
        stack.insert(DefaultGwSnapshot::new(None));
        assert!(stack.remove(None).is_some());
        assert!(stack.remove(None).is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_grows_past_capacity() {
        let mut stack = GatewayStack::with_capacity(1);
        stack.insert(DefaultGwSnapshot::new(A));
        stack.insert(DefaultGwSnapshot::new(B));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.capacity(), 1);
    }
}
