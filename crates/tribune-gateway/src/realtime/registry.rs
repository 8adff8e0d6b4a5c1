use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};

use tribune_core::Principal;

/// Process-unique connection id.
pub type ConnectionId = u64;

/// One live duplex channel belonging to a principal.
///
/// The relay never writes to the socket directly: it pushes frames into the
/// connection's bounded queue, which a single writer task drains in order.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    principal: Principal,
    tx: mpsc::Sender<Message>,
    close_tx: Arc<watch::Sender<Option<u16>>>,
}

impl Connection {
    /// Build a connection around an outbound queue. The returned receiver
    /// yields the close code once someone asks the session to close.
    pub fn new(
        id: ConnectionId,
        principal: Principal,
        tx: mpsc::Sender<Message>,
    ) -> (Self, watch::Receiver<Option<u16>>) {
        let (close_tx, close_rx) = watch::channel(None);
        let conn = Self {
            id,
            principal,
            tx,
            close_tx: Arc::new(close_tx),
        };
        (conn, close_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn sender(&self) -> &mpsc::Sender<Message> {
        &self.tx
    }

    /// Ask the owning session to close with `code`. First request wins.
    pub fn close(&self, code: u16) {
        self.close_tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(code);
                true
            } else {
                false
            }
        });
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("principal", &self.principal)
            .finish()
    }
}

/// Principal -> live connections.
///
/// Every mutation goes through `DashMap::entry`, so register/unregister on
/// the same principal serialize on its shard while fan-out reads elsewhere
/// proceed.
pub struct ConnectionRegistry {
    by_principal: DashMap<Principal, HashMap<ConnectionId, Connection>>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            by_principal: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConnectionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, conn: Connection) {
        self.by_principal
            .entry(conn.principal.clone())
            .or_default()
            .insert(conn.id, conn);
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn unregister(&self, principal: &Principal, id: ConnectionId) -> bool {
        let mut removed = false;
        self.by_principal.remove_if_mut(principal, |_, conns| {
            removed = conns.remove(&id).is_some();
            conns.is_empty()
        });
        removed
    }

    /// Snapshot of the principal's live connections; empty when offline.
    pub fn connections_for(&self, principal: &Principal) -> Vec<Connection> {
        self.by_principal
            .get(principal)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_registered(&self, principal: &Principal, id: ConnectionId) -> bool {
        self.by_principal
            .get(principal)
            .is_some_and(|conns| conns.contains_key(&id))
    }

    pub fn connection_count(&self) -> usize {
        self.by_principal.iter().map(|e| e.value().len()).sum()
    }

    pub fn principal_count(&self) -> usize {
        self.by_principal.len()
    }

    /// Signal every live connection to close (shutdown path). Sessions
    /// unregister themselves as they exit.
    pub fn close_all(&self, code: u16) {
        for entry in self.by_principal.iter() {
            for conn in entry.value().values() {
                conn.close(code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(reg: &ConnectionRegistry, who: &str) -> Connection {
        let (tx, _rx) = mpsc::channel(4);
        Connection::new(reg.next_id(), Principal::from(who), tx).0
    }

    #[test]
    fn multiple_tabs_per_principal() {
        let reg = ConnectionRegistry::new();
        let a1 = conn(&reg, "alice");
        let a2 = conn(&reg, "alice");
        reg.register(a1.clone());
        reg.register(a2.clone());

        let mut ids: Vec<_> = reg.connections_for(&"alice".into()).iter().map(|c| c.id()).collect();
        ids.sort();
        assert_eq!(ids, vec![a1.id(), a2.id()]);
        assert_eq!(reg.connection_count(), 2);
        assert_eq!(reg.principal_count(), 1);
    }

    #[test]
    fn unregister_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let a = conn(&reg, "alice");
        reg.register(a.clone());

        assert!(reg.unregister(a.principal(), a.id()));
        assert!(!reg.unregister(a.principal(), a.id()));
        assert!(reg.connections_for(a.principal()).is_empty());
        assert_eq!(reg.principal_count(), 0);
    }

    #[test]
    fn unregister_leaves_siblings() {
        let reg = ConnectionRegistry::new();
        let a1 = conn(&reg, "alice");
        let a2 = conn(&reg, "alice");
        reg.register(a1.clone());
        reg.register(a2.clone());

        reg.unregister(a1.principal(), a1.id());
        let left = reg.connections_for(&"alice".into());
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id(), a2.id());
        assert!(!reg.is_registered(a1.principal(), a1.id()));
    }

    #[test]
    fn offline_principal_yields_empty() {
        let reg = ConnectionRegistry::new();
        assert!(reg.connections_for(&"nobody".into()).is_empty());
        assert!(!reg.unregister(&"nobody".into(), 42));
    }

    #[test]
    fn close_keeps_first_code() {
        let (tx, _rx) = mpsc::channel(1);
        let (c, close_rx) = Connection::new(1, Principal::from("alice"), tx);
        c.close(1001);
        c.close(1000);
        assert_eq!(*close_rx.borrow(), Some(1001));
    }
}
