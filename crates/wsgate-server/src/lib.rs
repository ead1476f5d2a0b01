//! wsgate-server: WebSocket sessions gated behind an external token check.
//!
//! Each upgraded connection becomes a [`Session`] with a periodic heartbeat,
//! a serialized write path and a one-time authorization gate driven by the
//! first inbound frame.

pub mod auth;
pub mod config;
pub mod server;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use session::{HeartbeatConfig, Session, SessionConfig};
