//! Remote cluster access.
//!
//! - [`ClientBuilder`]: turns a cluster name and a timeout into a client handle
//! - [`ClusterRegistry`]: builder backed by the `[[clusters]]` configuration
//! - [`ClusterClient`]: HTTP client for one cluster API server
//! - [`WebSocketExecTransport`]: remote side of exec sessions

pub mod client;
pub mod exec;

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::config::ClusterConfig;

pub use client::ClusterClient;
pub use exec::{ExecConnection, WebSocketExecTransport};

/// Errors building or using a cluster client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No cluster with this name is configured.
    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    /// A URL could not be built.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request method is not a valid HTTP method.
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API server answered with a non-success status.
    #[error("cluster API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Builds remote-client handles for named clusters.
pub trait ClientBuilder: Send + Sync + 'static {
    type Client: Send + Sync + 'static;

    /// Returns a client for `cluster` whose requests are bounded by `timeout`.
    fn build(&self, cluster: &str, timeout: Duration) -> Result<Self::Client, ClientError>;
}

/// Client builder over the configured clusters.
#[derive(Debug, Clone, Default)]
pub struct ClusterRegistry {
    clusters: HashMap<String, ClusterConfig>,
}

impl ClusterRegistry {
    pub fn new(clusters: &[ClusterConfig]) -> Self {
        Self {
            clusters: clusters
                .iter()
                .map(|cluster| (cluster.name.clone(), cluster.clone()))
                .collect(),
        }
    }

    /// Configured cluster names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.clusters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

impl ClientBuilder for ClusterRegistry {
    type Client = ClusterClient;

    fn build(&self, cluster: &str, timeout: Duration) -> Result<ClusterClient, ClientError> {
        let config = self
            .clusters
            .get(cluster)
            .ok_or_else(|| ClientError::UnknownCluster(cluster.to_string()))?;
        ClusterClient::new(config, timeout)
    }
}
