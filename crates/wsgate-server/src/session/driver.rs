//! Per-session event loop.
//!
//! Multiplexes outbound writes, heartbeat ticks, the first inbound frame and
//! the verification outcome until the session terminates. Verification runs
//! on its own task so retries never delay pings or writes.

use super::heartbeat::HeartbeatConfig;
use super::reader::Reader;
use super::writer::{FrameSink, WriteFailure, WriteRequest};
use crate::auth::{authorize, RetryPolicy, TokenVerifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use wsgate_core::{AuthState, GateError, GateResult, VerificationRequest};

pub(crate) struct Driver<S> {
    pub(crate) sink: FrameSink<S>,
    pub(crate) write_rx: mpsc::Receiver<WriteRequest>,
    pub(crate) state_tx: watch::Sender<AuthState>,
    pub(crate) token: CancellationToken,
    pub(crate) heartbeat: HeartbeatConfig,
    pub(crate) retry: RetryPolicy,
    pub(crate) verifier: Arc<dyn TokenVerifier>,
    pub(crate) session_id: String,
    pub(crate) remote_addr: SocketAddr,
}

impl<S> Driver<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) async fn run(mut self, reader: Reader<S>, mut first_frame: oneshot::Receiver<Vec<u8>>) {
        let reader = tokio::spawn(reader.run());
        let mut ticker = self.heartbeat.ticker();
        let mut awaiting_first = true;
        let mut verification: Option<JoinHandle<GateResult<()>>> = None;

        loop {
            tokio::select! {
                biased;

                _ = self.token.cancelled() => break,

                Some(request) = self.write_rx.recv() => {
                    let result = self.sink.send(Message::text(request.payload)).await;
                    let broken = matches!(result, Err(WriteFailure::Broken(_)));
                    if let Err(e) = &result {
                        debug!(remote = %self.remote_addr, error = %e, "write failed");
                    }
                    let _ = request.result_tx.send(result.map_err(GateError::from));
                    if broken {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    match self.sink.send(Message::Ping(Vec::new())).await {
                        Ok(()) => trace!(remote = %self.remote_addr, "ping"),
                        Err(WriteFailure::Broken(e)) => {
                            warn!(remote = %self.remote_addr, error = %e, "ping failed, closing");
                            break;
                        }
                        Err(e) => debug!(remote = %self.remote_addr, error = %e, "ping not sent"),
                    }
                }

                frame = &mut first_frame, if awaiting_first => {
                    awaiting_first = false;
                    match frame {
                        Ok(frame) => verification = Some(self.spawn_verification(frame)),
                        // Reader ended before any data frame; it has already cancelled.
                        Err(_) => break,
                    }
                }

                outcome = join_verification(&mut verification) => {
                    verification = None;
                    match outcome {
                        Ok(()) => {
                            self.state_tx.send_if_modified(|state| state.advance(AuthState::Verified));
                            info!(remote = %self.remote_addr, id = %self.session_id, "session verified");
                        }
                        Err(e) => {
                            warn!(remote = %self.remote_addr, id = %self.session_id, error = %e, "authorization failed, closing");
                            break;
                        }
                    }
                }
            }
        }

        self.state_tx
            .send_if_modified(|state| state.advance(AuthState::Terminated));
        self.token.cancel();
        if let Some(handle) = verification {
            handle.abort();
        }
        self.sink.close().await;
        reader.abort();
        info!(remote = %self.remote_addr, "session terminated");
    }

    fn spawn_verification(&self, frame: Vec<u8>) -> JoinHandle<GateResult<()>> {
        let request = VerificationRequest::from_frame(&frame, self.session_id.clone());
        let verifier = self.verifier.clone();
        let policy = self.retry.clone();
        debug!(remote = %self.remote_addr, id = %request.id, "first frame received, verifying");
        tokio::spawn(async move { authorize(verifier.as_ref(), &request, &policy).await })
    }
}

async fn join_verification(handle: &mut Option<JoinHandle<GateResult<()>>>) -> GateResult<()> {
    match handle {
        Some(handle) => handle
            .await
            .unwrap_or_else(|e| Err(GateError::Other(format!("verification task failed: {e}")))),
        None => std::future::pending().await,
    }
}
