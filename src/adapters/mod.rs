//! Venue adapter implementations.
//!
//! Production deployments supply real REST/WebSocket adapters behind
//! [`crate::venue::VenueAdapter`]; this crate ships the deterministic
//! in-memory reference adapter the integration suite runs against.

pub mod sim;
