//! Session bridge: turns single-shot setup calls into addressable sessions.
//!
//! Setup calls allocate an identifier, register the session and return the
//! identifier immediately. Exec sessions additionally get a detached
//! attachment worker; log sessions are pure state waiting for a consumer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use protocol::ApiRequest;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::id::{generate_session_id, GenerationError, SessionId};
use super::log::LogSession;
use super::registry::SessionRegistry;
use super::terminal::{AttachError, AttachedTerminal, TerminalSession};
use super::transport::ExecTransport;
use super::worker::run_attachment_worker;

/// Default budget for exec setup (connect + attach).
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Default client budget for log streams.
pub const DEFAULT_LOG_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Default time a finished exec session stays queryable.
pub const DEFAULT_COMPLETED_RETENTION: Duration = Duration::from_secs(60);

/// Longest timeout a config or request may ask for (7 days).
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// [`MAX_TIMEOUT_SECS`] as a duration.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(MAX_TIMEOUT_SECS);

/// A setup call failed before any session was registered.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("could not generate session id: {0}")]
    IdGeneration(#[from] GenerationError),
}

/// Tunables for the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Used when a request does not carry its own timeout.
    pub exec_timeout: Duration,
    /// Lifetime of a registered log session.
    pub log_timeout: Duration,
    /// How long finished exec sessions stay in the registry.
    pub completed_retention: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            log_timeout: DEFAULT_LOG_TIMEOUT,
            completed_retention: DEFAULT_COMPLETED_RETENTION,
        }
    }
}

/// Registry of interactive exec sessions.
pub type TerminalRegistry = SessionRegistry<TerminalSession>;

/// Registry of pending log sessions for client type `C`.
pub type LogRegistry<C> = SessionRegistry<LogSession<C>>;

/// Owns both session registries and launches attachment workers.
pub struct SessionBridge<T: ExecTransport> {
    transport: Arc<T>,
    terminals: Arc<TerminalRegistry>,
    logs: Arc<LogRegistry<T::Client>>,
    options: BridgeOptions,
    /// Parent of every session's cancellation token.
    shutdown: CancellationToken,
}

impl<T: ExecTransport> SessionBridge<T> {
    /// Creates a bridge with empty registries.
    pub fn new(transport: T, options: BridgeOptions) -> Self {
        Self::with_registries(
            Arc::new(transport),
            Arc::new(SessionRegistry::new("terminal")),
            Arc::new(SessionRegistry::new("log")),
            options,
            CancellationToken::new(),
        )
    }

    /// Creates a bridge over existing registries.
    pub fn with_registries(
        transport: Arc<T>,
        terminals: Arc<TerminalRegistry>,
        logs: Arc<LogRegistry<T::Client>>,
        options: BridgeOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            transport,
            terminals,
            logs,
            options,
            shutdown,
        }
    }

    pub fn terminals(&self) -> &Arc<TerminalRegistry> {
        &self.terminals
    }

    pub fn logs(&self) -> &Arc<LogRegistry<T::Client>> {
        &self.logs
    }

    pub fn options(&self) -> &BridgeOptions {
        &self.options
    }

    /// Token cancelled when the bridge shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Timeout that applies to an exec or forwarded request, capped at
    /// [`MAX_TIMEOUT`].
    pub fn exec_timeout_for(&self, request: &ApiRequest) -> Duration {
        request
            .timeout_secs()
            .map(|secs| Duration::from_secs(secs.min(MAX_TIMEOUT_SECS)))
            .unwrap_or(self.options.exec_timeout)
            .min(MAX_TIMEOUT)
    }

    /// Registers an exec session and launches its attachment worker.
    ///
    /// Returns as soon as the session is registered. The worker's eventual
    /// outcome is only observable through the session's bound signal.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_exec_session(
        &self,
        request: ApiRequest,
        client: T::Client,
    ) -> Result<SessionId, SetupError> {
        let session_id = generate_session_id()?;
        let timeout = self.exec_timeout_for(&request);

        let (session, channels) = TerminalSession::new(
            session_id.clone(),
            self.shutdown.child_token(),
            self.options.completed_retention,
        );
        self.terminals.put(session_id.clone(), session);

        let span = tracing::info_span!("exec_session", session_id = %session_id, cluster = %request.cluster);
        tokio::spawn(
            run_attachment_worker(
                Arc::clone(&self.transport),
                client,
                request,
                session_id.clone(),
                channels,
                timeout,
            )
            .instrument(span),
        );

        tracing::info!(session_id = %session_id, timeout = ?timeout, "Registered exec session");
        Ok(session_id)
    }

    /// Registers a log session for a later consumer.
    ///
    /// The URL is neither validated nor probed here.
    pub fn register_log_session(
        &self,
        request: &ApiRequest,
        client: T::Client,
    ) -> Result<SessionId, SetupError> {
        let session_id = generate_session_id()?;
        let session = LogSession::new(client, request.url.clone(), self.options.log_timeout);
        self.logs.put(session_id.clone(), Arc::new(session));

        tracing::info!(session_id = %session_id, url = %request.url, "Registered log session");
        Ok(session_id)
    }

    /// Looks up an exec session and attaches to it.
    pub fn attach(&self, session_id: &str) -> Result<AttachedTerminal, AttachError> {
        let session = self
            .terminals
            .get(session_id)
            .ok_or_else(|| AttachError::NotFound(session_id.to_string()))?;
        session.attach()
    }

    /// Takes a log session out of the registry for consumption.
    pub fn take_log_session(&self, session_id: &str) -> Option<Arc<LogSession<T::Client>>> {
        self.logs.delete(session_id)
    }

    /// Removes expired sessions from both registries.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        self.terminals.sweep(now) + self.logs.sweep(now)
    }

    /// Starts periodic cleanup of both registries.
    pub fn start_sweepers(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.terminals.start_sweeper(interval, self.shutdown.clone()),
            self.logs.start_sweeper(interval, self.shutdown.clone()),
        ]
    }

    /// Cancels every worker and empties both registries.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.terminals.close_all();
        self.logs.close_all();
        tracing::info!("Session bridge shut down");
    }
}
