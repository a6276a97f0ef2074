//! Session bridge.
//!
//! This module turns single-shot setup requests into durable sessions that a
//! later connection can attach to. Sessions are identified by unguessable
//! ids and kept in per-kind registries until they are deleted or swept.

pub mod bridge;
pub mod id;
pub mod log;
pub mod registry;
pub mod terminal;
pub mod transport;
mod worker;

pub use bridge::{
    BridgeOptions, LogRegistry, SessionBridge, SetupError, TerminalRegistry, MAX_TIMEOUT,
    MAX_TIMEOUT_SECS,
};
pub use id::{generate_session_id, GenerationError, SessionId};
pub use log::LogSession;
pub use registry::{RegistryEntry, SessionRegistry};
pub use terminal::{
    AttachError, AttachedTerminal, AttachmentError, BoundSignal, ResizeEvents, SessionOutcome,
    TerminalIo, TerminalSession,
};
pub use transport::ExecTransport;
