//! Retry policy around a [`TokenVerifier`].
//!
//! Network failures are retried with a fixed backoff up to the attempt
//! budget. A denial or a malformed request ends verification immediately.

use super::verifier::{TokenVerifier, VerifyError};
use std::time::Duration;
use tracing::{debug, info, warn};
use wsgate_core::{GateError, GateResult, VerificationRequest};

/// How many times, and how patiently, to contact the verification endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Fixed wait after a network failure before the next attempt.
    pub backoff: Duration,
    /// Forward requests whose session identifier is empty instead of rejecting them.
    pub allow_empty_id: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(2),
            allow_empty_id: false,
        }
    }
}

/// Verify `request`, retrying network failures according to `policy`.
pub async fn authorize(
    verifier: &dyn TokenVerifier,
    request: &VerificationRequest,
    policy: &RetryPolicy,
) -> GateResult<()> {
    if request.id.is_empty() && !policy.allow_empty_id {
        warn!("no session identifier in request path");
        return Err(GateError::AuthDenied("empty session identifier".into()));
    }

    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        debug!(attempt, id = %request.id, "verifying token");
        match verifier.verify(request).await {
            Ok(()) => {
                info!(attempt, id = %request.id, "token verified");
                return Ok(());
            }
            Err(VerifyError::Denied(status)) => {
                info!(status, id = %request.id, "token rejected");
                return Err(GateError::AuthDenied(format!("endpoint returned status {status}")));
            }
            Err(VerifyError::Request(e)) => {
                warn!(error = %e, "could not build verification request");
                return Err(GateError::Request(e));
            }
            Err(VerifyError::Network(e)) => {
                if attempt < policy.max_attempts {
                    warn!(
                        attempt,
                        error = %e,
                        backoff_ms = policy.backoff.as_millis() as u64,
                        "verification endpoint unreachable, retrying"
                    );
                    tokio::time::sleep(policy.backoff).await;
                }
                last_error = e;
            }
        }
    }

    warn!(attempts = policy.max_attempts, "maximum verification attempts reached");
    Err(GateError::VerifyUnavailable {
        attempts: policy.max_attempts,
        last_error,
    })
}
