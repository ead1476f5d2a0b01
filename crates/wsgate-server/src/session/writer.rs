//! Write serializer.
//!
//! Callers hand payloads to the event loop through a queue of one and wait
//! on a private oneshot for the outcome. The event loop owns the sink, so at
//! most one frame is ever in flight.

use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wsgate_core::{GateError, GateResult};

/// One queued outbound text frame and the channel its outcome goes back on.
pub(crate) struct WriteRequest {
    pub payload: String,
    pub result_tx: oneshot::Sender<GateResult<()>>,
}

/// Submit `payload` and wait for its outcome, or for the session to end.
pub(crate) async fn submit(
    write_tx: &mpsc::Sender<WriteRequest>,
    token: &CancellationToken,
    payload: String,
) -> GateResult<()> {
    if token.is_cancelled() {
        return Err(GateError::Terminated);
    }

    let (result_tx, result_rx) = oneshot::channel();
    let request = WriteRequest { payload, result_tx };

    tokio::select! {
        biased;
        sent = write_tx.send(request) => {
            if sent.is_err() {
                return Err(GateError::Terminated);
            }
        }
        _ = token.cancelled() => return Err(GateError::Terminated),
    }

    tokio::select! {
        biased;
        result = result_rx => result.unwrap_or(Err(GateError::Terminated)),
        _ = token.cancelled() => Err(GateError::Terminated),
    }
}

/// Why a frame could not be written.
#[derive(Debug, Error)]
pub(crate) enum WriteFailure {
    /// The write deadline passed; the connection may still be usable.
    #[error("write deadline exceeded")]
    Timeout,
    /// The transport is gone.
    #[error("transport broken: {0}")]
    Broken(String),
    /// This frame was refused (e.g. too large); the connection is intact.
    #[error("frame rejected: {0}")]
    Rejected(String),
}

impl From<WriteFailure> for GateError {
    fn from(failure: WriteFailure) -> Self {
        match failure {
            WriteFailure::Timeout => GateError::Timeout,
            WriteFailure::Broken(e) | WriteFailure::Rejected(e) => GateError::Transport(e),
        }
    }
}

/// Write half of the transport, owned by the event loop.
pub(crate) struct FrameSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    write_timeout: Duration,
    closed: bool,
}

impl<S> FrameSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub(crate) fn new(sink: SplitSink<WebSocketStream<S>, Message>, write_timeout: Duration) -> Self {
        Self {
            sink,
            write_timeout,
            closed: false,
        }
    }

    /// Write one frame under the write deadline.
    pub(crate) async fn send(&mut self, message: Message) -> Result<(), WriteFailure> {
        if self.closed {
            return Err(WriteFailure::Broken("sink closed".into()));
        }
        match tokio::time::timeout(self.write_timeout, self.sink.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if is_broken(&e) => Err(WriteFailure::Broken(e.to_string())),
            Ok(Err(e)) => Err(WriteFailure::Rejected(e.to_string())),
            Err(_) => Err(WriteFailure::Timeout),
        }
    }

    /// Send a close frame and shut the write half. Only the first call acts.
    pub(crate) async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match tokio::time::timeout(self.write_timeout, self.sink.close()).await {
            Ok(Ok(())) => debug!("transport closed"),
            Ok(Err(e)) => debug!(error = %e, "transport close failed"),
            Err(_) => debug!("transport close timed out"),
        }
    }
}

fn is_broken(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::ConnectionClosed
            | tungstenite::Error::AlreadyClosed
            | tungstenite::Error::Io(_)
            | tungstenite::Error::Protocol(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcome_goes_back_to_submitter() {
        let (write_tx, mut write_rx) = mpsc::channel::<WriteRequest>(1);
        let token = CancellationToken::new();

        tokio::spawn(async move {
            while let Some(request) = write_rx.recv().await {
                let result = if request.payload == "bad" {
                    Err(GateError::Transport("rejected".into()))
                } else {
                    Ok(())
                };
                let _ = request.result_tx.send(result);
            }
        });

        assert!(submit(&write_tx, &token, "good".into()).await.is_ok());
        assert!(matches!(
            submit(&write_tx, &token, "bad".into()).await,
            Err(GateError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let (write_tx, _write_rx) = mpsc::channel::<WriteRequest>(1);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            submit(&write_tx, &token, "x".into()).await,
            Err(GateError::Terminated)
        ));
    }

    #[tokio::test]
    async fn pending_write_unblocks_on_cancel() {
        // Receiver is kept alive but never serviced.
        let (write_tx, _write_rx) = mpsc::channel::<WriteRequest>(1);
        let token = CancellationToken::new();

        let waiter = {
            let write_tx = write_tx.clone();
            let token = token.clone();
            tokio::spawn(async move { submit(&write_tx, &token, "x".into()).await })
        };
        tokio::task::yield_now().await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(GateError::Terminated)));
    }

    #[tokio::test]
    async fn dropped_request_reports_terminated() {
        let (write_tx, mut write_rx) = mpsc::channel::<WriteRequest>(1);
        let token = CancellationToken::new();
        tokio::spawn(async move {
            // Take the request and drop it without answering.
            let _ = write_rx.recv().await;
        });
        assert!(matches!(
            submit(&write_tx, &token, "x".into()).await,
            Err(GateError::Terminated)
        ));
    }

    #[test]
    fn failure_maps_to_gate_error() {
        assert_eq!(WriteFailure::Timeout.to_string(), "write deadline exceeded");
        assert!(matches!(GateError::from(WriteFailure::Timeout), GateError::Timeout));
        assert!(matches!(
            GateError::from(WriteFailure::Broken("reset".into())),
            GateError::Transport(e) if e == "reset"
        ));
    }
}
