//! WebSocket listener using tokio-tungstenite.
//!
//! Upgrades inbound TCP connections, capturing the request path during the
//! handshake, and turns each into a [`Session`].

use crate::auth::TokenVerifier;
use crate::session::{Session, SessionConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{debug, error, info, warn};
use wsgate_core::{GateError, GateResult};

/// Upgrade `stream` to a WebSocket and open a session on it.
pub async fn accept(
    stream: TcpStream,
    remote_addr: SocketAddr,
    config: SessionConfig,
    verifier: Arc<dyn TokenVerifier>,
) -> GateResult<Session> {
    let mut path = String::new();
    let capture_path = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        path = request.uri().path().to_string();
        Ok(response)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, capture_path)
        .await
        .map_err(|e| GateError::Upgrade(e.to_string()))?;

    debug!(remote = %remote_addr, path = %path, "WebSocket connection accepted");
    Ok(Session::open(ws_stream, remote_addr, path, config, verifier))
}

/// Start the WebSocket listener.
///
/// Returns the bound address and a receiver that yields opened sessions.
pub async fn start_listener(
    bind_addr: SocketAddr,
    config: SessionConfig,
    verifier: Arc<dyn TokenVerifier>,
) -> GateResult<(SocketAddr, mpsc::Receiver<Session>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| GateError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<Session>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    let config = config.clone();
                    let verifier = verifier.clone();
                    tokio::spawn(async move {
                        match accept(stream, addr, config, verifier).await {
                            Ok(session) => {
                                if tx.send(session).await.is_err() {
                                    warn!("session channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
            if tx.is_closed() {
                debug!("session receiver dropped, stopping listener");
                break;
            }
        }
    });

    Ok((local_addr, rx))
}
