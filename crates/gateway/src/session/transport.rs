//! Seam between the attachment worker and the remote exec endpoint.

use std::future::Future;

use protocol::ApiRequest;

use super::terminal::{AttachmentError, ResizeEvents, TerminalIo};

/// Remote side of an exec session.
///
/// The worker calls [`connect`](ExecTransport::connect) as soon as the
/// session is registered, waits for an attacher, then hands the attacher's
/// streams to [`stream`](ExecTransport::stream), which runs until the remote
/// process ends.
pub trait ExecTransport: Send + Sync + 'static {
    /// Remote-client handle produced by the cluster client builder.
    type Client: Send + Sync + 'static;

    /// An established, not yet streaming, remote exec connection.
    type Connection: Send + 'static;

    /// Opens the remote exec connection described by `request`.
    fn connect(
        &self,
        client: &Self::Client,
        request: &ApiRequest,
    ) -> impl Future<Output = Result<Self::Connection, AttachmentError>> + Send;

    /// Bridges the connection to the attacher's terminal until the remote
    /// process ends. Every size from `resize` is applied to the remote
    /// terminal.
    fn stream(
        &self,
        connection: Self::Connection,
        terminal: TerminalIo,
        resize: ResizeEvents,
    ) -> impl Future<Output = Result<(), AttachmentError>> + Send;
}
