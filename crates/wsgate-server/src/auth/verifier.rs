//! Verification endpoint client.
//!
//! A [`TokenVerifier`] performs exactly one verification attempt; the retry
//! policy lives in [`super::gate`].

use std::future::Future;
use std::pin::Pin;
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use wsgate_core::{GateError, GateResult, VerificationRequest};

/// Outcome of a failed verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The endpoint answered with anything but `200 OK`.
    #[error("denied with status {0}")]
    Denied(u16),
    /// The endpoint could not be reached.
    #[error("network error: {0}")]
    Network(String),
    /// The request could not be constructed.
    #[error("request error: {0}")]
    Request(String),
}

/// A single verification attempt against an authorization service.
pub trait TokenVerifier: Send + Sync {
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), VerifyError>> + Send + 'a>>;
}

/// Verifies tokens with `POST <endpoint>` and a JSON body.
pub struct HttpVerifier {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpVerifier {
    /// Create a verifier for `endpoint` (e.g. `http://localhost:5000/verify_token`).
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> GateResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| GateError::Config(format!("http client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TokenVerifier for HttpVerifier {
    fn verify<'a>(
        &'a self,
        request: &'a VerificationRequest,
    ) -> Pin<Box<dyn Future<Output = Result<(), VerifyError>> + Send + 'a>> {
        Box::pin(async move {
            debug!(url = %self.endpoint, id = %request.id, "posting verification request");

            let response = self
                .http_client
                .post(&self.endpoint)
                .json(request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_builder() {
                        VerifyError::Request(e.to_string())
                    } else {
                        VerifyError::Network(e.to_string())
                    }
                })?;

            let status = response.status();
            if status == StatusCode::OK {
                Ok(())
            } else {
                Err(VerifyError::Denied(status.as_u16()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};

    /// Serve a `/verify_token` route that records bodies and accepts one token.
    async fn spawn_endpoint(accepted: &'static str) -> (SocketAddr, Arc<Mutex<Vec<VerificationRequest>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_route = seen.clone();
        let app = Router::new().route(
            "/verify_token",
            post(move |Json(body): Json<VerificationRequest>| {
                let seen = seen_route.clone();
                async move {
                    let status = if body.token == accepted {
                        AxumStatus::OK
                    } else if body.token == "no_content" {
                        AxumStatus::NO_CONTENT
                    } else {
                        AxumStatus::UNAUTHORIZED
                    };
                    seen.lock().unwrap().push(body);
                    status
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, seen)
    }

    #[tokio::test]
    async fn ok_status_authorizes() {
        let (addr, seen) = spawn_endpoint("secret_token").await;
        let verifier =
            HttpVerifier::new(format!("http://{addr}/verify_token"), Duration::from_secs(5)).unwrap();
        let req = VerificationRequest::from_frame(b"secret_token", "stream");

        assert_eq!(verifier.verify(&req).await, Ok(()));
        assert_eq!(seen.lock().unwrap().as_slice(), &[req]);
    }

    #[tokio::test]
    async fn unauthorized_status_is_denial() {
        let (addr, _seen) = spawn_endpoint("secret_token").await;
        let verifier =
            HttpVerifier::new(format!("http://{addr}/verify_token"), Duration::from_secs(5)).unwrap();
        let req = VerificationRequest::from_frame(b"wrong", "stream");

        assert_eq!(verifier.verify(&req).await, Err(VerifyError::Denied(401)));
    }

    #[tokio::test]
    async fn other_success_status_is_denial() {
        let (addr, _seen) = spawn_endpoint("secret_token").await;
        let verifier =
            HttpVerifier::new(format!("http://{addr}/verify_token"), Duration::from_secs(5)).unwrap();
        let req = VerificationRequest::from_frame(b"no_content", "stream");

        assert_eq!(verifier.verify(&req).await, Err(VerifyError::Denied(204)));
    }

    #[tokio::test]
    async fn unknown_route_is_denial() {
        let (addr, _seen) = spawn_endpoint("secret_token").await;
        let verifier =
            HttpVerifier::new(format!("http://{addr}/nope"), Duration::from_secs(5)).unwrap();
        let req = VerificationRequest::from_frame(b"secret_token", "stream");

        assert_eq!(verifier.verify(&req).await, Err(VerifyError::Denied(404)));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let verifier =
            HttpVerifier::new(format!("http://{addr}/verify_token"), Duration::from_secs(5)).unwrap();
        let req = VerificationRequest::from_frame(b"secret_token", "stream");

        assert!(matches!(verifier.verify(&req).await, Err(VerifyError::Network(_))));
    }

    #[tokio::test]
    async fn malformed_endpoint_is_request_error() {
        let verifier = HttpVerifier::new("not a url", Duration::from_secs(5)).unwrap();
        let req = VerificationRequest::from_frame(b"secret_token", "stream");

        assert!(matches!(verifier.verify(&req).await, Err(VerifyError::Request(_))));
    }

    #[test]
    fn error_messages() {
        assert_eq!(VerifyError::Denied(401).to_string(), "denied with status 401");
        assert_eq!(VerifyError::Network("refused".into()).to_string(), "network error: refused");
    }
}
