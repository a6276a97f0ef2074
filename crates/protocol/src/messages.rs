//! HTTP message bodies exchanged between the dashboard and the gateway.
//!
//! Every setup endpoint accepts the same [`ApiRequest`] body. Only the fields
//! relevant to an endpoint are read; the rest default to empty.

use serde::{Deserialize, Serialize};

/// Request body accepted by the request, exec and logs endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiRequest {
    /// Name of the configured cluster to talk to.
    pub cluster: String,
    /// Client timeout in seconds. Zero means "use the gateway default".
    pub timeout: u64,
    /// HTTP method for forwarded requests.
    pub method: String,
    /// Absolute API path, e.g. `/api/v1/namespaces/default/pods/foo/log`.
    pub url: String,
    /// Raw body for forwarded requests.
    pub body: String,
    /// Target container for exec sessions.
    pub container: Option<String>,
    /// Command to run for exec sessions. Empty means "start a shell".
    pub command: Vec<String>,
    /// Shell to start when no command is given.
    pub shell: Option<String>,
}

impl ApiRequest {
    /// Returns the requested timeout, or `None` when the caller left it unset.
    pub fn timeout_secs(&self) -> Option<u64> {
        (self.timeout > 0).then_some(self.timeout)
    }
}

/// Response to a forwarded API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Body returned by the cluster, trailing newline trimmed.
    pub data: String,
}

/// Response to an exec or logs setup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    /// Identifier the caller uses to attach to the session later.
    pub id: String,
}

/// Error body returned for any failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short human readable description.
    pub error: String,
    /// Underlying cause, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Creates an error body without details.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminalSize {
    /// Columns.
    #[serde(rename = "Width")]
    pub width: u16,
    /// Rows.
    #[serde(rename = "Height")]
    pub height: u16,
}

impl TerminalSize {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self {
            width: 80,
            height: 24,
        }
    }
}

/// Health report returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub terminal_sessions: usize,
    pub log_sessions: usize,
}
