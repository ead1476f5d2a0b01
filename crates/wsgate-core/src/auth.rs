//! Authorization state and the verification request sent to the endpoint.

use serde::{Deserialize, Serialize};

/// Authorization state of a session.
///
/// Transitions only `Unverified -> Verified` or `Unverified -> Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unverified,
    Verified,
    Terminated,
}

impl AuthState {
    /// Apply a transition out of `Unverified`.
    ///
    /// Returns `false` (and leaves `self` untouched) when the state has
    /// already left `Unverified` or `next` is `Unverified`.
    pub fn advance(&mut self, next: AuthState) -> bool {
        if *self != AuthState::Unverified || next == AuthState::Unverified {
            return false;
        }
        *self = next;
        true
    }

    pub fn is_settled(&self) -> bool {
        *self != AuthState::Unverified
    }
}

/// Body of a `POST /verify_token` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Credential carried by the first inbound frame.
    pub token: String,
    /// Session identifier derived from the request path.
    pub id: String,
}

impl VerificationRequest {
    /// Build a request from the raw bytes of the first frame.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the endpoint decides.
    pub fn from_frame(frame: &[u8], id: impl Into<String>) -> Self {
        Self {
            token: String::from_utf8_lossy(frame).into_owned(),
            id: id.into(),
        }
    }
}
