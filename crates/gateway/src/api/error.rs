//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use protocol::ErrorResponse;
use thiserror::Error;

use crate::cluster::ClientError;
use crate::session::SetupError;

/// Failure of an HTTP handler, rendered as an [`ErrorResponse`] body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request body is empty")]
    EmptyBody,

    #[error("Could not decode request body")]
    Decode(#[source] serde_json::Error),

    #[error("Could not create cluster client")]
    Client(#[source] ClientError),

    #[error("Could not generate terminal session id")]
    Setup(#[from] SetupError),

    #[error("Cluster API request failed: {0}")]
    Upstream(#[source] ClientError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::EmptyBody => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Decode(_) | Self::Client(_) | Self::Setup(_) | Self::Upstream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::Decode(e) => Some(e.to_string()),
            Self::Client(e) => Some(e.to_string()),
            Self::Setup(e) => Some(e.to_string()),
            Self::Upstream(_) | Self::EmptyBody | Self::SessionNotFound(_) => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, details = ?self.details(), "Request failed");
        } else {
            tracing::debug!(error = %self, "Request rejected");
        }

        let mut body = ErrorResponse::new(self.to_string());
        if let Some(details) = self.details() {
            body = body.with_details(details);
        }
        (status, Json(body)).into_response()
    }
}
