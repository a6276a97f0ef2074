//! Attachment worker: one detached task per exec session.

use std::sync::Arc;
use std::time::Duration;

use protocol::ApiRequest;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::bridge::MAX_TIMEOUT;
use super::id::SessionId;
use super::terminal::{AttachmentError, ResizeEvents, SessionOutcome, TerminalIo, WorkerChannels};
use super::transport::ExecTransport;

/// Runs one exec session to completion and writes its bound signal.
///
/// The outcome is written exactly once: on remote termination, on failure,
/// when `timeout` elapses before the remote answers or an attacher shows up,
/// or when the session is cancelled. The registry entry is left in place so
/// a late attacher can still observe the outcome.
pub(crate) async fn run_attachment_worker<T: ExecTransport>(
    transport: Arc<T>,
    client: T::Client,
    request: ApiRequest,
    session_id: SessionId,
    channels: WorkerChannels,
    timeout: Duration,
) {
    let WorkerChannels {
        bound,
        attach,
        resize,
        cancel,
    } = channels;

    tracing::debug!(session_id = %session_id, timeout = ?timeout, "Attachment worker started");

    let outcome = tokio::select! {
        _ = cancel.cancelled() => Err(AttachmentError::Cancelled),
        result = attach_and_stream(transport.as_ref(), &client, &request, attach, resize, timeout) => result,
    };

    match &outcome {
        Ok(()) => tracing::info!(session_id = %session_id, "Exec session finished"),
        Err(e) => tracing::warn!(session_id = %session_id, error = %e, "Exec session ended with error"),
    }

    if !bound.complete(outcome) {
        tracing::debug!(session_id = %session_id, "Bound signal was already written");
    }
}

async fn attach_and_stream<T: ExecTransport>(
    transport: &T,
    client: &T::Client,
    request: &ApiRequest,
    attach: oneshot::Receiver<TerminalIo>,
    resize: ResizeEvents,
    timeout: Duration,
) -> SessionOutcome {
    let now = Instant::now();
    let deadline = now
        .checked_add(timeout)
        .unwrap_or_else(|| now + MAX_TIMEOUT);

    let connection = tokio::time::timeout_at(deadline, transport.connect(client, request))
        .await
        .map_err(|_| AttachmentError::Timeout(timeout))??;

    let terminal = match tokio::time::timeout_at(deadline, attach).await {
        Ok(Ok(terminal)) => terminal,
        Ok(Err(_)) => return Err(AttachmentError::Abandoned),
        Err(_) => return Err(AttachmentError::Timeout(timeout)),
    };

    transport.stream(connection, terminal, resize).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::terminal::TerminalSession;
    use tokio_util::sync::CancellationToken;

    struct IdleTransport;

    impl ExecTransport for IdleTransport {
        type Client = ();
        type Connection = ();

        async fn connect(&self, _client: &(), _request: &ApiRequest) -> Result<(), AttachmentError> {
            Ok(())
        }

        async fn stream(
            &self,
            _connection: (),
            _terminal: TerminalIo,
            _resize: ResizeEvents,
        ) -> Result<(), AttachmentError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_still_reports_outcome() {
        let (session, channels) = TerminalSession::new(
            "s".to_string(),
            CancellationToken::new(),
            Duration::from_secs(60),
        );

        let worker = tokio::spawn(run_attachment_worker(
            Arc::new(IdleTransport),
            (),
            ApiRequest::default(),
            "s".to_string(),
            channels,
            Duration::MAX,
        ));

        assert_eq!(
            session.bound().wait().await,
            Err(AttachmentError::Timeout(Duration::MAX))
        );
        assert!(worker.await.is_ok());
    }
}
