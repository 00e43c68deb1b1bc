//! Quay Daemon - multi-tenant deployment controller
//!
//! The Quay daemon provides:
//! - REST API for services, releases and environment
//! - Process supervision of each service's active release
//! - Log and event streaming for observers

use clap::Parser;
use quay_daemon::error::{DaemonError, DaemonResult};
use quay_daemon::{DaemonConfig, Server};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Quay Daemon CLI
#[derive(Parser)]
#[command(name = "quayd")]
#[command(about = "Quay Daemon - deploy and supervise tarball releases", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QUAY_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "QUAY_LISTEN_ADDR")]
    listen: Option<String>,

    /// Data directory
    #[arg(short, long, env = "QUAY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "QUAY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "QUAY_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Print startup banner
    println!(
        r#"
   ___
  / _ \ _   _  __ _ _   _
 | | | | | | |/ _` | | | |
 | |_| | |_| | (_| | |_| |
  \__\_\\__,_|\__,_|\__, |
                    |___/

  Quay - Multi-tenant Deployment Controller
  Version: {}
  Data: {}
  Listening: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.storage.data_dir.display(),
        config.server.listen_addr
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
