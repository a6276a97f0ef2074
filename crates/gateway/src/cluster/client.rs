//! HTTP client for a single cluster API server.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use super::ClientError;
use crate::config::ClusterConfig;

/// Client handle for one cluster, valid for its configured timeout.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ClusterClient {
    name: String,
    server: Url,
    token: Option<String>,
    http: reqwest::Client,
    timeout: Duration,
    insecure: bool,
}

impl ClusterClient {
    /// Builds a client whose requests are bounded by `timeout`.
    pub fn new(config: &ClusterConfig, timeout: Duration) -> Result<Self, ClientError> {
        let server = Url::parse(&config.server)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", config.server, e)))?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.insecure_skip_tls_verify)
            .build()?;

        Ok(Self {
            name: config.name.clone(),
            server,
            token: config.token.clone(),
            http,
            timeout,
            insecure: config.insecure_skip_tls_verify,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether server certificates go unchecked.
    pub fn insecure(&self) -> bool {
        self.insecure
    }

    /// Resolves an absolute API path against the server URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.server
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Websocket URL for `path` with `query` appended.
    pub fn websocket_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ClientError> {
        let mut url = self.endpoint(path)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(ClientError::InvalidUrl(format!(
                    "unsupported scheme for websocket: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(format!("cannot switch {} to {}", url, scheme)))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Sends a request and returns the response body as text.
    ///
    /// An empty `method` means GET. An empty `body` sends no body.
    pub async fn request(&self, method: &str, path: &str, body: &str) -> Result<String, ClientError> {
        let method = if method.is_empty() {
            Method::GET
        } else {
            Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| ClientError::InvalidMethod(method.to_string()))?
        };

        let mut builder = self.authorize(self.http.request(method.clone(), self.endpoint(path)?));
        if !body.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.to_string());
        }

        tracing::debug!(cluster = %self.name, method = %method, path = %path, "Forwarding request");

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(text)
    }

    /// Starts a streaming GET of `path`.
    ///
    /// The response body is left unread for the caller to stream.
    pub async fn stream(&self, path: &str) -> Result<Response, ClientError> {
        let response = self
            .authorize(self.http.get(self.endpoint(path)?))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}
