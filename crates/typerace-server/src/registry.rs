use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use typerace_core::protocol::ServerEvent;

/// Identifier for one live WebSocket connection.
pub type ConnId = u64;

/// Handle to push events to a connected client. Sends to a connection whose
/// receive loop has already exited are swallowed.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub conn_id: ConnId,
    pub user_id: String,
    pub username: String,
    pub tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Maps live connections to authenticated users and logical rooms. A user may
/// hold several concurrent connections; targeted emits reach all of them.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    connections: DashMap<ConnId, ConnectionHandle>,
    by_user: DashMap<String, HashSet<ConnId>>,
    rooms: DashMap<String, HashSet<ConnId>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_conn_id(&self) -> ConnId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection for an authenticated user.
    pub fn bind(
        &self,
        conn_id: ConnId,
        user_id: &str,
        username: &str,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.connections.insert(
            conn_id,
            ConnectionHandle {
                conn_id,
                user_id: user_id.to_string(),
                username: username.to_string(),
                tx,
            },
        );
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id);
    }

    /// Drop a connection and all of its room memberships. Returns the handle
    /// that was bound, if any.
    pub fn unbind(&self, conn_id: ConnId) -> Option<ConnectionHandle> {
        let (_, handle) = self.connections.remove(&conn_id)?;
        let now_empty = self
            .by_user
            .get_mut(&handle.user_id)
            .map(|mut set| {
                set.remove(&conn_id);
                set.is_empty()
            })
            .unwrap_or(false);
        if now_empty {
            self.by_user.remove_if(&handle.user_id, |_, set| set.is_empty());
        }
        for mut room in self.rooms.iter_mut() {
            room.value_mut().remove(&conn_id);
        }
        Some(handle)
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user
            .get(user_id)
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Best-effort send to every connection bound to `user_id`. No-op for
    /// offline users.
    pub fn emit_to_user(&self, user_id: &str, event: &ServerEvent) {
        if let Some(conns) = self.by_user.get(user_id) {
            for conn_id in conns.iter() {
                if let Some(handle) = self.connections.get(conn_id) {
                    let _ = handle.tx.send(event.clone());
                }
            }
        }
    }

    pub fn join_room(&self, room_id: &str, conn_id: ConnId) {
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(conn_id);
    }

    pub fn leave_room(&self, room_id: &str, conn_id: ConnId) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(&conn_id);
        }
    }

    /// Best-effort send to every member of a room.
    pub fn emit_to_room(&self, room_id: &str, event: &ServerEvent) {
        if let Some(members) = self.rooms.get(room_id) {
            for conn_id in members.iter() {
                if let Some(handle) = self.connections.get(conn_id) {
                    let _ = handle.tx.send(event.clone());
                }
            }
        }
    }

    /// Delete a room and its membership set.
    pub fn drop_room(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> ServerEvent {
        ServerEvent::QueueStatus { queue_size: 1 }
    }

    #[test]
    fn bind_then_unbind_goes_offline() {
        let registry = SessionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = registry.next_conn_id();

        registry.bind(id, "u1", "alice", tx);
        assert!(registry.is_online("u1"));

        let handle = registry.unbind(id).unwrap();
        assert_eq!(handle.username, "alice");
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn emit_reaches_every_connection_of_a_user() {
        let registry = SessionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let a = registry.next_conn_id();
        let b = registry.next_conn_id();
        registry.bind(a, "u1", "alice", tx1);
        registry.bind(b, "u1", "alice", tx2);

        registry.emit_to_user("u1", &event());
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn emit_to_offline_user_is_a_noop() {
        let registry = SessionRegistry::new();
        registry.emit_to_user("ghost", &event());
    }

    #[test]
    fn emit_to_closed_connection_is_swallowed() {
        let registry = SessionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let id = registry.next_conn_id();
        registry.bind(id, "u1", "alice", tx);
        registry.emit_to_user("u1", &event());
    }

    #[test]
    fn rooms_route_to_members_only() {
        let registry = SessionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        let a = registry.next_conn_id();
        let b = registry.next_conn_id();
        registry.bind(a, "u1", "alice", tx1);
        registry.bind(b, "u2", "bob", tx2);

        registry.join_room("match:1", a);
        registry.emit_to_room("match:1", &event());
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());

        registry.leave_room("match:1", a);
        registry.emit_to_room("match:1", &event());
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn unbind_leaves_rooms() {
        let registry = SessionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = registry.next_conn_id();
        registry.bind(id, "u1", "alice", tx);
        registry.join_room("match:1", id);

        registry.unbind(id);
        registry.emit_to_room("match:1", &event());
        assert!(rx.try_recv().is_err());
    }
}
