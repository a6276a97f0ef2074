//! Gateway orchestrator.
//!
//! Wires the cluster registry, the session bridge and the HTTP router
//! together, runs the periodic registry sweepers and owns the shutdown
//! token every session's cancellation derives from.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{self, AppState};
use crate::cluster::{ClusterRegistry, WebSocketExecTransport};
use crate::config::Config;
use crate::session::{SessionBridge, SessionRegistry};

/// Lifecycle state of the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Not serving.
    Stopped,
    /// Accepting HTTP requests.
    Running,
    /// Draining connections and cancelling sessions.
    ShuttingDown,
}

/// Owns every long-lived component of the gateway.
pub struct Gateway {
    state: Arc<AppState>,
    status: Arc<RwLock<GatewayState>>,
    shutdown_token: CancellationToken,
}

impl Gateway {
    /// Creates a gateway from a validated configuration.
    pub fn new(config: Config) -> Self {
        let shutdown_token = CancellationToken::new();
        let clusters = ClusterRegistry::new(&config.clusters);
        let transport = WebSocketExecTransport::new(config.session.default_shell.clone());

        let bridge = SessionBridge::with_registries(
            Arc::new(transport),
            Arc::new(SessionRegistry::new("terminal")),
            Arc::new(SessionRegistry::new("log")),
            config.session.bridge_options(),
            shutdown_token.clone(),
        );

        info!(
            clusters = ?clusters.names(),
            exec_timeout = ?config.session.exec_timeout(),
            "Gateway initialized"
        );

        Self {
            state: Arc::new(AppState {
                config,
                clusters,
                bridge,
            }),
            status: Arc::new(RwLock::new(GatewayState::Stopped)),
            shutdown_token,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.state.config
    }

    pub fn bridge(&self) -> &SessionBridge<WebSocketExecTransport> {
        &self.state.bridge
    }

    pub async fn status(&self) -> GatewayState {
        *self.status.read().await
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// HTTP router over this gateway's state.
    pub fn router(&self) -> Router {
        api::router(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until
    /// [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<()> {
        let addr = self.state.config.server.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        self.serve(listener).await
    }

    /// Serves HTTP on `listener` until the shutdown token is cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        {
            let mut status = self.status.write().await;
            if *status != GatewayState::Stopped {
                anyhow::bail!("Gateway is already running");
            }
            *status = GatewayState::Running;
        }

        let sweepers = self
            .state
            .bridge
            .start_sweepers(self.state.config.session.cleanup_interval());
        info!(addr = %local_addr, "Gateway listening");

        let token = self.shutdown_token.clone();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .context("HTTP server failed");

        self.shutdown().await;
        for handle in sweepers {
            if let Err(e) = handle.await {
                debug!("Sweeper task ended abnormally: {}", e);
            }
        }

        *self.status.write().await = GatewayState::Stopped;
        info!("Gateway stopped");
        result
    }

    /// Stops accepting requests and cancels every session.
    pub async fn shutdown(&self) {
        {
            let mut status = self.status.write().await;
            if *status == GatewayState::Running {
                *status = GatewayState::ShuttingDown;
            }
        }
        self.shutdown_token.cancel();
        self.state.bridge.shutdown();
    }
}
