//! kubebridge gateway
//!
//! HTTP service bridging a cluster dashboard to exec shells and log tails.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gateway::config::{default_config_path, Config};
use gateway::Gateway;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// kubebridge - session bridge for cluster exec shells and log streams.
#[derive(Parser, Debug)]
#[command(name = "kubebridge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Address to listen on (overrides the configuration)
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },

    /// Validate the configuration and exit
    CheckConfig,

    /// Print the effective configuration as TOML
    PrintConfig {
        /// Write the configuration to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();

    if let Commands::Serve {
        listen: Some(listen),
    } = &cli.command
    {
        config.server.listen_addr = listen.clone();
    }

    let _guard = init_tracing(&config, cli.verbose)?;

    match cli.command {
        Commands::Serve { .. } => {
            config.validate()?;
            tracing::info!("Using config file: {:?}", config_path);
            run(config).await?;
        }
        Commands::CheckConfig => {
            config
                .validate()
                .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
            println!("Configuration OK: {}", config_path.display());
            println!("  Listen address: {}", config.server.listen_addr);
            println!("  Clusters:       {}", config.clusters.len());
        }
        Commands::PrintConfig { output: Some(path) } => {
            config.save(&path)?;
            println!("Configuration written to {}", path.display());
        }
        Commands::PrintConfig { output: None } => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Installs the global subscriber. When `server.log_dir` is set, logs also
/// go to a daily rolling file; the returned guard must outlive `main`.
fn init_tracing(config: &Config, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose {
        "debug"
    } else {
        config.server.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    match &config.server.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "kubebridge.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let gateway = Gateway::new(config);
    let token = gateway.shutdown_token();

    let signals = tokio::spawn(async move {
        tokio::select! {
            _ = wait_for_shutdown_signal() => {}
            _ = token.cancelled() => return,
        }
        token.cancel();
    });

    let result = gateway.run().await;
    signals.abort();
    result
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        _ => {
            tracing::warn!("Failed to register signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl+C");
}
