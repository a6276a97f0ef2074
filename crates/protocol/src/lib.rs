//! # kubebridge Protocol Library
//!
//! Wire types shared by the gateway and its tests:
//!
//! - **Messages**: JSON bodies of the HTTP setup endpoints
//! - **Channel frames**: the channel-multiplexed exec websocket format spoken
//!   by the cluster API server
//!
//! ## Modules
//!
//! - [`messages`]: request and response bodies
//! - [`channel`]: exec websocket frames and status documents
//! - [`error`]: error types

pub mod channel;
pub mod error;
pub mod messages;

pub use channel::{ChannelFrame, ExecStatus, StreamChannel, EXEC_SUBPROTOCOL};
pub use error::{ProtocolError, Result};
pub use messages::{
    ApiRequest, ApiResponse, ErrorResponse, HealthResponse, SessionResponse, TerminalSize,
};
