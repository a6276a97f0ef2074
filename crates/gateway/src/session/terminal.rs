//! Interactive terminal sessions.
//!
//! A [`TerminalSession`] is the registry-visible half of an exec session. The
//! other half, [`WorkerChannels`], is handed to the attachment worker when the
//! session is created:
//!
//! ```text
//!   attacher                    TerminalSession                 worker
//!   --------                    ---------------                 ------
//!   attach() ---- TerminalIo ---> attach slot ----------------> WorkerChannels.attach
//!   resize() ---- latest size --> resize watch ---------------> ResizeEvents
//!   bound().wait() <------------- bound watch <---------------- BoundWriter::complete
//! ```
//!
//! The worker owns the only [`BoundWriter`], so the bound signal has a single
//! writer by construction. The resize channel holds only the most recent size,
//! so producers never block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use protocol::TerminalSize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::id::SessionId;
use super::registry::RegistryEntry;

/// Capacity of the input and output byte channels between attacher and worker.
pub const TERMINAL_CHANNEL_CAPACITY: usize = 256;

/// Terminal outcome reported through the bound signal.
pub type SessionOutcome = Result<(), AttachmentError>;

/// Failures of the attachment worker.
///
/// These never propagate to the setup caller. They are only observable
/// through the session's bound signal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachmentError {
    /// The remote exec endpoint could not be reached.
    #[error("remote endpoint unreachable: {0}")]
    Unreachable(String),

    /// The remote process ended abnormally.
    #[error("remote session failed: {0}")]
    Remote(String),

    /// Nothing attached (or the remote did not answer) within the setup timeout.
    #[error("session timed out after {0:?}")]
    Timeout(Duration),

    /// The session was removed from the registry or the gateway shut down.
    #[error("session cancelled")]
    Cancelled,

    /// The attacher dropped its terminal streams mid-session.
    #[error("terminal detached")]
    Detached,

    /// The worker went away without reporting an outcome.
    #[error("session worker exited without reporting")]
    Abandoned,

    /// The remote stream broke.
    #[error("terminal stream error: {0}")]
    Io(String),
}

/// Errors returned to an attacher.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttachError {
    /// No session with this id is registered.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// Another connection already attached.
    #[error("session already attached: {0}")]
    AlreadyAttached(SessionId),

    /// The worker has already finished.
    #[error("session already finished: {0}")]
    Finished(SessionId),
}

#[derive(Debug, Clone)]
struct Bound {
    outcome: SessionOutcome,
    at: Instant,
}

/// Write side of the bound signal. Held only by the attachment worker.
#[derive(Debug)]
pub struct BoundWriter {
    tx: watch::Sender<Option<Bound>>,
}

impl BoundWriter {
    /// Records the session outcome.
    ///
    /// Returns `false` and leaves the first outcome untouched if the signal
    /// was already written.
    pub fn complete(&self, outcome: SessionOutcome) -> bool {
        self.tx.send_if_modified(move |state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Bound {
                outcome,
                at: Instant::now(),
            });
            true
        })
    }
}

/// Read side of the bound signal. Cheap to clone; every clone observes the
/// same single outcome.
#[derive(Debug, Clone)]
pub struct BoundSignal {
    rx: watch::Receiver<Option<Bound>>,
}

impl BoundSignal {
    /// Returns the outcome if the worker has reported one.
    pub fn peek(&self) -> Option<SessionOutcome> {
        self.rx.borrow().as_ref().map(|bound| bound.outcome.clone())
    }

    pub fn is_sent(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Instant at which the outcome was recorded.
    pub fn completed_at(&self) -> Option<Instant> {
        self.rx.borrow().as_ref().map(|bound| bound.at)
    }

    /// Waits until the worker reports the session outcome.
    pub async fn wait(&mut self) -> SessionOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(state) => state
                .as_ref()
                .map(|bound| bound.outcome.clone())
                .unwrap_or(Err(AttachmentError::Abandoned)),
            Err(_) => Err(AttachmentError::Abandoned),
        }
    }
}

/// Terminal resize updates as seen by the worker.
#[derive(Debug)]
pub struct ResizeEvents {
    rx: watch::Receiver<Option<TerminalSize>>,
}

impl ResizeEvents {
    /// Waits for the next size. Sizes pushed while the worker was busy are
    /// coalesced into the latest one.
    ///
    /// Returns `None` once the session has been dropped.
    pub async fn next(&mut self) -> Option<TerminalSize> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(size) = *self.rx.borrow_and_update() {
                return Some(size);
            }
        }
    }
}

/// Worker-side terminal streams, handed over by the attacher.
#[derive(Debug)]
pub struct TerminalIo {
    /// Keystrokes from the attacher.
    pub input: mpsc::Receiver<Bytes>,
    /// Output for the attacher.
    pub output: mpsc::Sender<Bytes>,
}

/// Everything the attachment worker owns for one session.
#[derive(Debug)]
pub struct WorkerChannels {
    pub bound: BoundWriter,
    pub attach: oneshot::Receiver<TerminalIo>,
    pub resize: ResizeEvents,
    pub cancel: CancellationToken,
}

/// One in-flight interactive shell.
#[derive(Debug)]
pub struct TerminalSession {
    id: SessionId,
    bound: BoundSignal,
    resize_tx: watch::Sender<Option<TerminalSize>>,
    attach_tx: Mutex<Option<oneshot::Sender<TerminalIo>>>,
    /// Set only once the worker has received the terminal streams.
    attached: AtomicBool,
    cancel: CancellationToken,
    created_at: Instant,
    /// How long a finished session stays queryable before the sweeper drops it.
    retention: Duration,
}

impl TerminalSession {
    /// Creates a pending session and the channels its worker needs.
    pub fn new(
        id: SessionId,
        cancel: CancellationToken,
        retention: Duration,
    ) -> (Arc<Self>, WorkerChannels) {
        let (bound_tx, bound_rx) = watch::channel(None);
        let (resize_tx, resize_rx) = watch::channel(None);
        let (attach_tx, attach_rx) = oneshot::channel();

        let session = Arc::new(Self {
            id,
            bound: BoundSignal { rx: bound_rx },
            resize_tx,
            attach_tx: Mutex::new(Some(attach_tx)),
            attached: AtomicBool::new(false),
            cancel: cancel.clone(),
            created_at: Instant::now(),
            retention,
        });

        let channels = WorkerChannels {
            bound: BoundWriter { tx: bound_tx },
            attach: attach_rx,
            resize: ResizeEvents { rx: resize_rx },
            cancel,
        };

        (session, channels)
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// A reader handle on the bound signal.
    pub fn bound(&self) -> BoundSignal {
        self.bound.clone()
    }

    /// Whether the worker has reported an outcome.
    pub fn is_finished(&self) -> bool {
        self.bound.is_sent()
    }

    /// Whether the worker is still consuming resize updates.
    pub fn resize_open(&self) -> bool {
        !self.resize_tx.is_closed()
    }

    /// Whether an attacher's streams reached the worker.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Pushes a new terminal size to the worker. Never blocks.
    pub fn resize(&self, size: TerminalSize) -> Result<(), AttachError> {
        if !self.resize_open() {
            return Err(AttachError::Finished(self.id.clone()));
        }
        self.resize_tx.send_replace(Some(size));
        Ok(())
    }

    /// Claims the session and hands fresh terminal streams to the worker.
    ///
    /// Only one attach succeeds per session.
    pub fn attach(self: &Arc<Self>) -> Result<AttachedTerminal, AttachError> {
        if self.is_finished() {
            return Err(AttachError::Finished(self.id.clone()));
        }

        let sender = self
            .attach_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| self.unavailable())?;

        let (input_tx, input_rx) = mpsc::channel(TERMINAL_CHANNEL_CAPACITY);
        let (output_tx, output_rx) = mpsc::channel(TERMINAL_CHANNEL_CAPACITY);

        sender
            .send(TerminalIo {
                input: input_rx,
                output: output_tx,
            })
            .map_err(|_| AttachError::Finished(self.id.clone()))?;
        self.attached.store(true, Ordering::Release);

        tracing::debug!(session_id = %self.id, "Terminal attached");

        Ok(AttachedTerminal {
            session: Arc::clone(self),
            input: input_tx,
            output: output_rx,
            bound: self.bound(),
        })
    }

    /// Error for an attach that found the slot already taken. The slot is
    /// also consumed by an attach that lost the race with the worker giving
    /// up, in which case the session is finished rather than attached.
    fn unavailable(&self) -> AttachError {
        if self.is_attached() {
            AttachError::AlreadyAttached(self.id.clone())
        } else {
            AttachError::Finished(self.id.clone())
        }
    }

    /// Stops the worker. The worker reports [`AttachmentError::Cancelled`]
    /// unless it already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl RegistryEntry for TerminalSession {
    fn close(&self) {
        self.cancel();
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.bound
            .completed_at()
            .is_some_and(|at| now.saturating_duration_since(at) >= self.retention)
    }
}

/// Attacher-side handle returned by [`TerminalSession::attach`].
#[derive(Debug)]
pub struct AttachedTerminal {
    session: Arc<TerminalSession>,
    input: mpsc::Sender<Bytes>,
    output: mpsc::Receiver<Bytes>,
    bound: BoundSignal,
}

impl AttachedTerminal {
    pub fn id(&self) -> &SessionId {
        self.session.id()
    }

    /// Sends keystrokes to the remote shell.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<(), AttachmentError> {
        self.input
            .send(data.into())
            .await
            .map_err(|_| AttachmentError::Detached)
    }

    /// Receives the next chunk of remote output, or `None` once the worker
    /// has stopped streaming.
    pub async fn read(&mut self) -> Option<Bytes> {
        self.output.recv().await
    }

    pub fn resize(&self, size: TerminalSize) -> Result<(), AttachError> {
        self.session.resize(size)
    }

    /// Waits for the session outcome.
    pub async fn wait(&mut self) -> SessionOutcome {
        self.bound.wait().await
    }
}
