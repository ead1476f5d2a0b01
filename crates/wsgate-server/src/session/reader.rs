//! Inbound read path.
//!
//! Runs as its own task so a blocked read never stalls heartbeat or writes.
//! The first data frame goes to the authorization gate; later frames queue
//! for `Session::read_value`. Any read failure ends the session.

use super::heartbeat::ReadDeadline;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use wsgate_core::{GateError, GateResult};

pub(crate) type Inbound = GateResult<Vec<u8>>;

pub(crate) struct Reader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    deadline: ReadDeadline,
    first_frame: Option<oneshot::Sender<Vec<u8>>>,
    inbound_tx: mpsc::Sender<Inbound>,
    token: CancellationToken,
    remote_addr: SocketAddr,
}

impl<S> Reader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(
        stream: SplitStream<WebSocketStream<S>>,
        read_window: Duration,
        first_frame: oneshot::Sender<Vec<u8>>,
        inbound_tx: mpsc::Sender<Inbound>,
        token: CancellationToken,
        remote_addr: SocketAddr,
    ) -> Self {
        Self {
            stream,
            deadline: ReadDeadline::new(read_window),
            first_frame: Some(first_frame),
            inbound_tx,
            token,
            remote_addr,
        }
    }

    pub(crate) async fn run(mut self) {
        if let Err(e) = self.read_loop().await {
            // Surface the cause to a waiting reader; a full queue just means
            // it will see `Terminated` instead.
            let _ = self.inbound_tx.try_send(Err(e));
            self.token.cancel();
        }
    }

    /// Returns `Ok(())` only when the session was ended locally.
    async fn read_loop(&mut self) -> GateResult<()> {
        loop {
            let next = tokio::select! {
                _ = self.token.cancelled() => return Ok(()),
                next = tokio::time::timeout_at(self.deadline.at(), self.stream.next()) => next,
            };

            let message = match next {
                Err(_) => {
                    warn!(remote = %self.remote_addr, "no frame within read window, closing");
                    return Err(GateError::Timeout);
                }
                Ok(None) => {
                    debug!(remote = %self.remote_addr, "transport ended");
                    return Err(GateError::Transport("connection closed".into()));
                }
                Ok(Some(Err(e))) => {
                    warn!(remote = %self.remote_addr, error = %e, "read failed");
                    return Err(GateError::Transport(e.to_string()));
                }
                Ok(Some(Ok(message))) => message,
            };

            // Pongs and data both prove the peer is alive.
            self.deadline.extend();

            match message {
                Message::Text(_) | Message::Binary(_) => self.deliver(message.into_data()).await?,
                Message::Pong(_) => trace!(remote = %self.remote_addr, "pong"),
                Message::Ping(_) => trace!(remote = %self.remote_addr, "ping"),
                Message::Close(frame) => {
                    let code = frame.as_ref().map(|f| f.code);
                    match code {
                        None | Some(CloseCode::Normal) | Some(CloseCode::Away) => {
                            debug!(remote = %self.remote_addr, "peer closed connection");
                        }
                        Some(code) => {
                            warn!(remote = %self.remote_addr, code = u16::from(code), "unexpected close");
                        }
                    }
                    return Err(GateError::Transport("connection closed by peer".into()));
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn deliver(&mut self, payload: Vec<u8>) -> GateResult<()> {
        if let Some(first) = self.first_frame.take() {
            // The event loop holds the receiver until it has been used.
            let _ = first.send(payload);
            return Ok(());
        }

        tokio::select! {
            sent = self.inbound_tx.send(Ok(payload)) => sent.map_err(|_| GateError::Terminated),
            _ = self.token.cancelled() => Err(GateError::Terminated),
        }
    }
}
