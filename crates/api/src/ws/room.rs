//! Room routing for pub/sub
//!
//! Rooms are flat string names (`admins`, `business:<id>`, `ticket:<id>`).
//! A connection may sit in any number of rooms; membership is tracked here,
//! not on the connection.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::connection::Connection;
use super::events::ServerEvent;

pub struct RoomRouter {
    rooms: RwLock<HashMap<String, Vec<Arc<Connection>>>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection to a room. Joining a room twice is a no-op.
    pub async fn join(&self, room: &str, conn: Arc<Connection>) {
        let mut rooms = self.rooms.write().await;
        let members = rooms.entry(room.to_string()).or_default();
        if members.iter().any(|c| c.session_id == conn.session_id) {
            return;
        }
        members.push(Arc::clone(&conn));

        tracing::debug!(
            room = %room,
            session_id = %conn.session_id,
            room_size = members.len(),
            "Connection joined room"
        );
    }

    /// Remove a connection from a room.
    pub async fn leave(&self, room: &str, session_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room) {
            members.retain(|c| c.session_id != session_id);
            if members.is_empty() {
                rooms.remove(room);
                tracing::debug!(room = %room, "Removed empty room");
            }
        }
    }

    /// Broadcast an event to every member of a room.
    ///
    /// `exclude` skips one session (typically the sender of a typing
    /// indicator). Send errors are ignored; closed connections are swept
    /// when their socket task exits.
    pub async fn broadcast(&self, room: &str, event: ServerEvent, exclude: Option<Uuid>) {
        let rooms = self.rooms.read().await;
        let Some(members) = rooms.get(room) else {
            tracing::debug!(room = %room, "Broadcast to empty room");
            return;
        };

        let mut delivered = 0;
        for conn in members {
            if Some(conn.session_id) == exclude {
                continue;
            }
            if conn.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                tracing::warn!(
                    session_id = %conn.session_id,
                    room = %room,
                    "Failed to send event to connection (likely closed)"
                );
            }
        }

        tracing::debug!(room = %room, recipients = delivered, "Broadcast event");
    }

    /// Remove a connection from every room it joined.
    pub async fn remove_connection(&self, session_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        for members in rooms.values_mut() {
            members.retain(|c| c.session_id != session_id);
        }
        rooms.retain(|_, members| !members.is_empty());
    }

    pub async fn room_size(&self, room: &str) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use tokio::sync::mpsc;

    fn conn() -> (Arc<Connection>, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Arc::new(Connection::new(
            Uuid::new_v4(),
            Identity::Admin(Uuid::new_v4()),
            "Support".to_string(),
            tx,
        ));
        (conn, rx)
    }

    #[tokio::test]
    async fn test_join_and_leave() {
        let router = RoomRouter::new();
        let (c, _rx) = conn();

        assert_eq!(router.room_size("admins").await, 0);
        router.join("admins", Arc::clone(&c)).await;
        assert_eq!(router.room_size("admins").await, 1);

        // Double join does not duplicate membership
        router.join("admins", Arc::clone(&c)).await;
        assert_eq!(router.room_size("admins").await, 1);

        router.leave("admins", c.session_id).await;
        assert_eq!(router.room_size("admins").await, 0);
        assert_eq!(router.room_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_members() {
        let router = RoomRouter::new();
        let (c1, mut rx1) = conn();
        let (c2, mut rx2) = conn();

        router.join("ticket:abc", c1).await;
        router.join("ticket:abc", c2).await;

        router.broadcast("ticket:abc", ServerEvent::Pong, None).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_excludes_sender() {
        let router = RoomRouter::new();
        let (c1, mut rx1) = conn();
        let (c2, mut rx2) = conn();
        let sender = c1.session_id;

        router.join("ticket:abc", c1).await;
        router.join("ticket:abc", c2).await;

        router
            .broadcast("ticket:abc", ServerEvent::Pong, Some(sender))
            .await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_to_missing_room_is_noop() {
        let router = RoomRouter::new();
        router.broadcast("ticket:none", ServerEvent::Pong, None).await;
    }

    #[tokio::test]
    async fn test_remove_connection_from_all_rooms() {
        let router = RoomRouter::new();
        let (c, _rx) = conn();

        router.join("admins", Arc::clone(&c)).await;
        router.join("admin:broadcast", Arc::clone(&c)).await;
        assert_eq!(router.room_count().await, 2);

        router.remove_connection(c.session_id).await;
        assert_eq!(router.room_count().await, 0);
    }
}
