//! Broadcaster handle
//!
//! Mutation paths receive a [`Broadcaster`] instead of reaching for the
//! router directly, so persistence logic can run with broadcasting switched
//! off (tests, offline tooling) without faking sockets.

use std::sync::Arc;

use uuid::Uuid;

use super::events::ServerEvent;
use super::room::RoomRouter;

#[derive(Clone)]
pub enum Broadcaster {
    /// Deliver to live connections through the room router.
    Live(Arc<RoomRouter>),
    /// Discard everything. Persistence still happens; nothing is delivered.
    Silent,
}

impl Broadcaster {
    pub async fn broadcast(&self, room: &str, event: ServerEvent) {
        match self {
            Broadcaster::Live(router) => router.broadcast(room, event, None).await,
            Broadcaster::Silent => {}
        }
    }

    pub async fn broadcast_except(&self, room: &str, event: ServerEvent, exclude: Uuid) {
        match self {
            Broadcaster::Live(router) => router.broadcast(room, event, Some(exclude)).await,
            Broadcaster::Silent => {}
        }
    }
}
