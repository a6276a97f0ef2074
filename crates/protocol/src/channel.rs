//! Channel-multiplexed frames used by the remote exec websocket.
//!
//! # Frame Format
//!
//! Each binary websocket message carries exactly one frame:
//! - 1 byte: channel number
//! - N bytes: payload
//!
//! Channels 0-2 carry the standard streams. Channel 3 carries a single JSON
//! status document when the remote process ends. Channel 4 carries JSON
//! terminal resize requests from the client.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::messages::TerminalSize;

/// Websocket subprotocol negotiated with the cluster API server.
pub const EXEC_SUBPROTOCOL: &str = "v4.channel.k8s.io";

/// Channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StreamChannel {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
    Status = 3,
    Resize = 4,
}

impl TryFrom<u8> for StreamChannel {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Stdin),
            1 => Ok(Self::Stdout),
            2 => Ok(Self::Stderr),
            3 => Ok(Self::Status),
            4 => Ok(Self::Resize),
            other => Err(ProtocolError::UnknownChannel(other)),
        }
    }
}

/// A single frame on the exec websocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFrame {
    pub channel: StreamChannel,
    pub payload: Vec<u8>,
}

impl ChannelFrame {
    pub fn new(channel: StreamChannel, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }

    /// Frame carrying terminal input.
    pub fn stdin(data: &[u8]) -> Self {
        Self::new(StreamChannel::Stdin, data.to_vec())
    }

    /// Frame asking the remote side to resize its terminal.
    pub fn resize(size: TerminalSize) -> Result<Self> {
        let payload = serde_json::to_vec(&size)?;
        Ok(Self::new(StreamChannel::Resize, payload))
    }

    /// Encode the frame as a websocket binary payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(1 + self.payload.len());
        output.push(self.channel as u8);
        output.extend_from_slice(&self.payload);
        output
    }

    /// Decode a websocket binary payload.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (&first, payload) = data.split_first().ok_or(ProtocolError::EmptyFrame)?;
        Ok(Self {
            channel: StreamChannel::try_from(first)?,
            payload: payload.to_vec(),
        })
    }
}

/// Status document sent on the status channel when the remote process ends.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecStatus {
    /// `Success` or `Failure`.
    pub status: String,
    pub message: Option<String>,
    pub reason: Option<String>,
}

impl ExecStatus {
    /// Parse a status channel payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn is_success(&self) -> bool {
        self.status == "Success"
    }

    /// Human readable failure description.
    pub fn describe(&self) -> String {
        match (&self.message, &self.reason) {
            (Some(message), _) => message.clone(),
            (None, Some(reason)) => reason.clone(),
            (None, None) => format!("remote process ended with status {:?}", self.status),
        }
    }
}
