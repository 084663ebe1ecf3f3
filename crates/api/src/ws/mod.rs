//! Real-time gateway
//!
//! Room-based pub/sub over WebSockets. Connections authenticate at the
//! handshake, join rooms keyed by flat string names, and receive the same
//! canonical payloads the REST surface returns.

pub mod broadcast;
pub mod connection;
pub mod events;
pub mod handler;
pub mod room;

pub use broadcast::Broadcaster;
pub use events::{ClientEvent, ServerEvent};
pub use room::RoomRouter;
