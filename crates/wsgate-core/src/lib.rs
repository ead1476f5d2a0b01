//! wsgate-core: shared types for the WebSocket authorization gate.
//!
//! Provides the error taxonomy, the authorization state machine values,
//! the verification request wire type, and session identifier derivation.

pub mod auth;
pub mod error;
pub mod path;

// Re-export commonly used items at crate root.
pub use auth::{AuthState, VerificationRequest};
pub use error::{GateError, GateResult};
pub use path::session_id_from_path;
