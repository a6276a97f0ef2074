//! # kubebridge Gateway Library
//!
//! HTTP gateway that turns single-shot setup calls into addressable,
//! long-lived cluster sessions.
//!
//! ## Overview
//!
//! A dashboard asks the gateway to set up an exec shell or a log tail and
//! immediately receives a session identifier. It later comes back with that
//! identifier to attach an interactive terminal or to pull the log stream.
//! In between, the gateway keeps the session in a registry and, for exec
//! sessions, a detached worker drives the remote exec connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Gateway                            │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                 HTTP API (axum router)                 │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │  ┌─────────────────────────┐  ┌───────────────────────────┐  │
//! │  │     Session Bridge      │  │     Cluster Registry      │  │
//! │  │  terminals │ log tails  │  │   reqwest + websocket     │  │
//! │  └─────────────────────────┘  └───────────────────────────┘  │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │        Attachment workers (one task per exec)          │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gateway::{Config, Gateway};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!     config.validate()?;
//!
//!     let gateway = Gateway::new(config);
//!     gateway.run().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: Session identifiers, registries, terminals and workers
//! - [`cluster`]: Cluster API clients and the websocket exec transport
//! - [`api`]: HTTP routes and error mapping
//! - [`gateway`]: Main gateway coordinator

pub mod api;
pub mod cluster;
pub mod config;
pub mod gateway;
pub mod session;

// Re-export protocol for convenience
pub use protocol;

pub use config::Config;

pub use session::{
    AttachError, AttachedTerminal, AttachmentError, BridgeOptions, ExecTransport, LogSession,
    SessionBridge, SessionId, SessionRegistry, SetupError, TerminalSession,
};

pub use cluster::{ClientBuilder, ClientError, ClusterClient, ClusterRegistry, WebSocketExecTransport};

pub use api::{ApiError, AppState};

pub use gateway::{Gateway, GatewayState};
