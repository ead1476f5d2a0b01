//! Accept loop: opens a session per connection and runs the echo service on it.

use crate::auth::{HttpVerifier, TokenVerifier};
use crate::config::ServerConfig;
use crate::session::Session;
use crate::transport::websocket;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use wsgate_core::GateResult;

/// The gate server instance.
pub struct GateServer {
    config: ServerConfig,
    verifier: Arc<dyn TokenVerifier>,
}

impl GateServer {
    /// Create a server that verifies tokens against `config.verify_url`.
    pub fn new(config: ServerConfig) -> GateResult<Self> {
        let verifier = HttpVerifier::new(config.verify_url.clone(), config.request_timeout)?;
        Ok(Self::with_verifier(config, Arc::new(verifier)))
    }

    pub fn with_verifier(config: ServerConfig, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { config, verifier }
    }

    /// Accept connections until the listener shuts down.
    pub async fn run(self) -> GateResult<()> {
        let (local_addr, mut sessions) = websocket::start_listener(
            self.config.bind_addr,
            self.config.session.clone(),
            self.verifier.clone(),
        )
        .await?;

        info!(addr = %local_addr, verify_url = %self.config.verify_url, "wsgate ready");

        while let Some(session) = sessions.recv().await {
            tokio::spawn(serve_echo(session));
        }

        info!("listener closed, shutting down");
        Ok(())
    }
}

/// Echo every JSON value the peer sends until the session ends.
pub async fn serve_echo(session: Session) {
    let remote = session.remote_addr();
    loop {
        let value: Value = match session.read_value().await {
            Ok(value) => value,
            Err(e) => {
                debug!(remote = %remote, error = %e, "read ended");
                break;
            }
        };
        if let Err(e) = session.write_value(&value).await {
            debug!(remote = %remote, error = %e, "write failed");
            break;
        }
    }
    session.close();
    info!(remote = %remote, id = %session.session_id(), "session ended");
}
