//! Per-socket connection state

use std::collections::HashMap;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::Identity;

use super::events::ServerEvent;

/// One live WebSocket connection.
///
/// The writer half of the socket drains `tx`; everything else in the
/// process talks to the connection through [`Connection::send`].
pub struct Connection {
    pub session_id: Uuid,
    pub identity: Identity,
    /// Display name used for typing attribution
    pub display_name: String,
    tx: mpsc::UnboundedSender<ServerEvent>,
    /// Server-side typing expiry tasks, one per ticket. Refreshing a typing
    /// indicator aborts and replaces the previous task.
    typing_timers: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl Connection {
    pub fn new(
        session_id: Uuid,
        identity: Identity,
        display_name: String,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) -> Self {
        Self {
            session_id,
            identity,
            display_name,
            tx,
            typing_timers: Mutex::new(HashMap::new()),
        }
    }

    /// Queue an event for delivery. Fails only when the socket writer has
    /// shut down.
    pub fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<ServerEvent>> {
        self.tx.send(event)
    }

    /// Install a typing expiry task for a ticket, aborting any previous one.
    pub async fn set_typing_timer(&self, ticket_id: Uuid, task: JoinHandle<()>) {
        let mut timers = self.typing_timers.lock().await;
        if let Some(previous) = timers.insert(ticket_id, task) {
            previous.abort();
        }
    }

    /// Cancel the typing expiry task for a ticket, if any.
    pub async fn clear_typing_timer(&self, ticket_id: Uuid) {
        let mut timers = self.typing_timers.lock().await;
        if let Some(task) = timers.remove(&ticket_id) {
            task.abort();
        }
    }

    /// Cancel every pending typing expiry task. Called on disconnect.
    pub async fn clear_all_typing_timers(&self) {
        let mut timers = self.typing_timers.lock().await;
        for (_, task) in timers.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (Connection, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Connection::new(
            Uuid::new_v4(),
            Identity::Admin(Uuid::new_v4()),
            "Support".to_string(),
            tx,
        );
        (conn, rx)
    }

    #[tokio::test]
    async fn test_send_delivers_to_channel() {
        let (conn, mut rx) = connection();
        conn.send(ServerEvent::Pong).unwrap();
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Pong)));
    }

    #[tokio::test]
    async fn test_send_fails_after_receiver_dropped() {
        let (conn, rx) = connection();
        drop(rx);
        assert!(conn.send(ServerEvent::Pong).is_err());
    }

    #[tokio::test]
    async fn test_typing_timer_replacement_aborts_previous() {
        let (conn, _rx) = connection();
        let ticket_id = Uuid::new_v4();

        let first = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        conn.set_typing_timer(ticket_id, first).await;

        let second = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        conn.set_typing_timer(ticket_id, second).await;

        // Yield so the abort propagates.
        tokio::task::yield_now().await;
        let timers = conn.typing_timers.lock().await;
        assert_eq!(timers.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_all_typing_timers() {
        let (conn, _rx) = connection();
        for _ in 0..3 {
            let task = tokio::spawn(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            });
            conn.set_typing_timer(Uuid::new_v4(), task).await;
        }

        conn.clear_all_typing_timers().await;
        let timers = conn.typing_timers.lock().await;
        assert!(timers.is_empty());
    }
}
