//! Authorization gate: one-time token verification against an external endpoint.

pub mod gate;
pub mod verifier;

pub use gate::{authorize, RetryPolicy};
pub use verifier::{HttpVerifier, TokenVerifier, VerifyError};
