//! Socket registry and accepted-ID allocation
//!
//! The registry is owned exclusively by the dispatcher task; every
//! mutation happens there, which serializes it against all transport
//! callbacks without a lock.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::mpsc;

use crate::common::ConnectionId;

use super::socket::SocketCtrl;

/// First ID handed to a server-accepted connection. Caller-supplied IDs
/// are expected to stay below this range.
pub const ACCEPTED_ID_BASE: ConnectionId = 5000;

/// Role of a registered socket, fixed at registration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    /// Listening socket accepting inbound connections
    Listener,
    /// Stream socket, outbound or accepted
    Stream,
}

/// One registered socket.
///
/// The ctrl channel is the registry's handle on the transport: the
/// stream itself lives inside its socket task and never leaves it.
pub(crate) struct SocketEntry {
    pub role: SocketRole,
    pub secure: bool,
    /// Stamped at registration; events from spawned tasks carry the
    /// generation they were registered under, and stale ones are dropped.
    pub generation: u64,
    pub ctrl: mpsc::UnboundedSender<SocketCtrl>,
    /// Bound address, listeners only; fallback when an accepted peer
    /// address cannot be resolved.
    pub local_addr: Option<SocketAddr>,
    /// Completion callback of an in-flight upgrade, streams only.
    pub pending_upgrade: Option<Box<dyn FnOnce() + Send>>,
}

impl SocketEntry {
    pub fn listener(
        generation: u64,
        ctrl: mpsc::UnboundedSender<SocketCtrl>,
        local_addr: SocketAddr,
    ) -> Self {
        Self {
            role: SocketRole::Listener,
            secure: false,
            generation,
            ctrl,
            local_addr: Some(local_addr),
            pending_upgrade: None,
        }
    }

    pub fn stream(generation: u64, ctrl: mpsc::UnboundedSender<SocketCtrl>, secure: bool) -> Self {
        Self {
            role: SocketRole::Stream,
            secure,
            generation,
            ctrl,
            local_addr: None,
            pending_upgrade: None,
        }
    }
}

/// ID-indexed socket registry
pub(crate) struct Registry {
    entries: HashMap<ConnectionId, SocketEntry>,
    next_accepted_id: ConnectionId,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            next_accepted_id: ACCEPTED_ID_BASE,
        }
    }

    pub fn put(&mut self, id: ConnectionId, entry: SocketEntry) {
        self.entries.insert(id, entry);
    }

    pub fn get(&self, id: ConnectionId) -> Option<&SocketEntry> {
        self.entries.get(&id)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut SocketEntry> {
        self.entries.get_mut(&id)
    }

    pub fn remove(&mut self, id: ConnectionId) -> Option<SocketEntry> {
        self.entries.remove(&id)
    }

    /// Allocate the next ID for an accepted connection. Monotonic,
    /// never reused while the process runs.
    pub fn allocate_accepted_id(&mut self) -> ConnectionId {
        let id = self.next_accepted_id;
        self.next_accepted_id += 1;
        id
    }

    /// IDs of all currently-registered sockets. `close_all` iterates a
    /// snapshot because closing mutates the registry.
    pub fn snapshot_ids(&self) -> Vec<ConnectionId> {
        self.entries.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctrl() -> mpsc::UnboundedSender<SocketCtrl> {
        mpsc::unbounded_channel().0
    }

    #[test]
    fn test_accepted_ids_start_at_base_and_increase() {
        let mut registry = Registry::new();
        assert_eq!(registry.allocate_accepted_id(), 5000);
        assert_eq!(registry.allocate_accepted_id(), 5001);
        assert_eq!(registry.allocate_accepted_id(), 5002);
    }

    #[test]
    fn test_removal_does_not_recycle_ids() {
        let mut registry = Registry::new();
        let id = registry.allocate_accepted_id();
        registry.put(id, SocketEntry::stream(1, ctrl(), false));
        registry.remove(id);
        assert_eq!(registry.allocate_accepted_id(), 5001);
    }

    #[test]
    fn test_put_get_remove() {
        let mut registry = Registry::new();
        registry.put(1, SocketEntry::listener(1, ctrl(), "127.0.0.1:8080".parse().unwrap()));
        registry.put(2, SocketEntry::stream(2, ctrl(), true));

        assert_eq!(registry.get(1).unwrap().role, SocketRole::Listener);
        let stream = registry.get(2).unwrap();
        assert_eq!(stream.role, SocketRole::Stream);
        assert!(stream.secure);

        assert!(registry.remove(1).is_some());
        assert!(registry.get(1).is_none());
        assert!(registry.remove(1).is_none());
    }

    #[test]
    fn test_snapshot_is_detached_from_mutation() {
        let mut registry = Registry::new();
        registry.put(1, SocketEntry::stream(1, ctrl(), false));
        registry.put(2, SocketEntry::stream(2, ctrl(), false));

        let mut ids = registry.snapshot_ids();
        ids.sort_unstable();
        registry.clear();

        assert_eq!(ids, vec![1, 2]);
        assert!(registry.snapshot_ids().is_empty());
    }
}
