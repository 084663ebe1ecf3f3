//! Fleetdesk Shared Types and Utilities
//!
//! This crate contains the domain types, room naming conventions, and
//! database utilities shared across the Fleetdesk platform.

pub mod db;
pub mod rooms;
pub mod types;

pub use db::*;
pub use types::*;
