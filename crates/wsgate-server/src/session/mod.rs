//! Connection session: one upgraded WebSocket gated behind token verification.
//!
//! Each session runs a single event loop task that owns the
//! write half of the transport. The loop spawns a reader task for the read
//! half and, once the first frame arrives, a verification task. Callers talk
//! to the loop only through channels.

mod driver;
mod heartbeat;
mod reader;
mod writer;

pub use heartbeat::HeartbeatConfig;

use crate::auth::{RetryPolicy, TokenVerifier};
use driver::Driver;
use futures_util::StreamExt;
use reader::{Inbound, Reader};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use writer::{FrameSink, WriteRequest};
use wsgate_core::{session_id_from_path, AuthState, GateError, GateResult};

/// Frames accepted from the peer but not yet taken by `read_value`.
const INBOUND_BUFFER: usize = 64;

/// Everything a session needs besides its transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub heartbeat: HeartbeatConfig,
    pub retry: RetryPolicy,
}

/// A server-side WebSocket session with heartbeat and an authorization gate.
pub struct Session {
    remote_addr: SocketAddr,
    path: String,
    session_id: String,
    write_tx: mpsc::Sender<WriteRequest>,
    inbound_rx: Mutex<mpsc::Receiver<Inbound>>,
    state_rx: watch::Receiver<AuthState>,
    token: CancellationToken,
}

impl Session {
    /// Wrap an already-upgraded transport and start its event loop.
    ///
    /// `path` is the request path of the upgrade; its first segment becomes
    /// the session identifier sent to the verification endpoint.
    pub fn open<S>(
        ws_stream: WebSocketStream<S>,
        remote_addr: SocketAddr,
        path: impl Into<String>,
        config: SessionConfig,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let path = path.into();
        let heartbeat = config.heartbeat.clamped();
        if heartbeat != config.heartbeat {
            warn!(?heartbeat, "zero heartbeat period raised to minimum");
        }
        let session_id = session_id_from_path(&path).to_string();
        let token = CancellationToken::new();

        let (sink, stream) = ws_stream.split();
        let (write_tx, write_rx) = mpsc::channel(1);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
        let (first_tx, first_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(AuthState::Unverified);

        let reader = Reader::new(
            stream,
            heartbeat.read_window(),
            first_tx,
            inbound_tx,
            token.clone(),
            remote_addr,
        );
        let driver = Driver {
            sink: FrameSink::new(sink, heartbeat.write_timeout),
            write_rx,
            state_tx,
            token: token.clone(),
            heartbeat,
            retry: config.retry,
            verifier,
            session_id: session_id.clone(),
            remote_addr,
        };
        tokio::spawn(driver.run(reader, first_rx));

        info!(remote = %remote_addr, path = %path, id = %session_id, "session opened");

        Self {
            remote_addr,
            path,
            session_id,
            write_tx,
            inbound_rx: Mutex::new(inbound_rx),
            state_rx,
            token,
        }
    }

    /// Close the session. Safe to call any number of times from any task.
    pub fn close(&self) {
        if !self.token.is_cancelled() {
            info!(remote = %self.remote_addr, "closing session");
        }
        self.token.cancel();
    }

    /// Resolves once the session has terminated, for whatever reason.
    pub async fn closed(&self) {
        self.token.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Request path the session was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Identifier derived from the request path.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current authorization state. A session that closed before being
    /// verified reports `Terminated` even while its event loop winds down.
    pub fn state(&self) -> AuthState {
        let state = *self.state_rx.borrow();
        if state == AuthState::Unverified && self.token.is_cancelled() {
            AuthState::Terminated
        } else {
            state
        }
    }

    /// Wait until the authorization gate has admitted the session.
    ///
    /// Fails with [`GateError::Terminated`] if the session is rejected or
    /// closes first.
    pub async fn authorized(&self) -> GateResult<()> {
        let mut state_rx = self.state_rx.clone();
        let settled = tokio::select! {
            biased;
            state = state_rx.wait_for(AuthState::is_settled) => {
                state.map(|s| *s).unwrap_or(AuthState::Terminated)
            }
            _ = self.token.cancelled() => AuthState::Terminated,
        };
        match settled {
            AuthState::Verified => Ok(()),
            _ => Err(GateError::Terminated),
        }
    }

    /// Serialize `value` as JSON and write it as one text frame.
    ///
    /// Blocks until the frame is written, fails, or the session terminates.
    pub async fn write_value<T: Serialize + ?Sized>(&self, value: &T) -> GateResult<()> {
        let payload = serde_json::to_string(value)?;
        writer::submit(&self.write_tx, &self.token, payload).await
    }

    /// Read the next application frame and decode it as JSON.
    ///
    /// Waits for authorization first. A read failure or an undecodable frame
    /// terminates the session. There is no deadline; callers cancel by
    /// dropping the future or closing the session.
    pub async fn read_value<T: DeserializeOwned>(&self) -> GateResult<T> {
        self.authorized().await?;

        let mut inbound = self.inbound_rx.lock().await;
        let frame = tokio::select! {
            biased;
            frame = inbound.recv() => frame,
            _ = self.token.cancelled() => None,
        };

        match frame {
            Some(Ok(bytes)) => serde_json::from_slice(&bytes).map_err(|e| {
                self.close();
                GateError::from(e)
            }),
            Some(Err(e)) => Err(e),
            None => Err(GateError::Terminated),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote_addr", &self.remote_addr)
            .field("path", &self.path)
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish()
    }
}
