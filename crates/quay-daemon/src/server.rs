//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use quay_deployment::{
    BroadcastPublisher, CommandInstaller, DependencyInstaller, DeploymentEngine,
    EngineComponents, NoopInstaller,
};
use quay_store::{DataLayout, FsBundleStore, FsMetadataStore};
use quay_supervisor::NativeSupervisor;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Quay Daemon Server
pub struct Server {
    config: DaemonConfig,
    engine: Arc<DeploymentEngine>,
    events: Arc<BroadcastPublisher>,
}

impl Server {
    /// Create a new server, loading persisted services from the data directory
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let data_dir = &config.storage.data_dir;
        tokio::fs::create_dir_all(data_dir).await?;
        let layout = DataLayout::new(data_dir.clone());

        let installer: Arc<dyn DependencyInstaller> =
            match CommandInstaller::from_command(&config.engine.install_command) {
                Some(installer) => Arc::new(installer),
                None => {
                    tracing::info!("No install command configured, dependency installation disabled");
                    Arc::new(NoopInstaller)
                }
            };

        let events = Arc::new(BroadcastPublisher::default());

        let components = EngineComponents {
            layout: layout.clone(),
            bundles: Arc::new(FsBundleStore::new(layout.clone())),
            metadata: Arc::new(FsMetadataStore::new(layout)),
            supervisor: Arc::new(NativeSupervisor::new(config.supervisor.native_config())),
            installer,
            events: events.clone(),
        };

        let engine_config = config.engine.engine_config(config.storage.sweep_orphans);
        let engine = DeploymentEngine::open(components, engine_config).await?;

        tracing::info!(
            services = engine.registry().len(),
            data_dir = %data_dir.display(),
            "Loaded services"
        );

        Ok(Self {
            config,
            engine: Arc::new(engine),
            events,
        })
    }

    /// Run the server
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;

        if self.config.auth.token().is_none() {
            tracing::warn!("No auth token configured, the API is open to anyone who can reach it");
        }

        // Create app state
        let state = AppState::new(
            self.engine.clone(),
            self.events.clone(),
            self.config.auth.token(),
        );

        // Create router
        let app = create_router(state, &self.config.server);

        // Create listener
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Quay daemon listening on {}", addr);

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("Quay daemon shutting down");

        // Stop every supervised process
        self.engine.shutdown().await;

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
