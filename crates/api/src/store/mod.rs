//! Persistence layer
//!
//! Tickets and messages are the only durable shared state. Every mutation
//! path is a self-contained read-modify-write against Postgres; nothing in
//! this layer caches ticket or message state across requests.

pub mod couriers;
pub mod messages;
pub mod tickets;
