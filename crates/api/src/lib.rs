//! Fleetdesk API Library
//!
//! Real-time support ticket messaging for the Fleetdesk logistics platform:
//! ticket/message persistence, the lifecycle state machine, and the
//! WebSocket gateway that mirrors every mutation into broadcast rooms.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod ws;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
