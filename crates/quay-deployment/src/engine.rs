//! Deployment Engine - release lifecycle and runtime control
//!
//! Every mutation follows the same order under the per-service lock:
//! compute the new state on a copy, save it, commit it to the registry,
//! publish the event. Extraction, installation and supervisor calls run
//! without the lock.

use crate::entrypoint::{self, EntryPoint};
use crate::error::{DeploymentError, Result};
use crate::events::EventPublisher;
use crate::install::DependencyInstaller;
use crate::registry::{ReleaseRegistry, ServiceSlot};
use quay_store::{BundleStore, DataLayout, MetadataStore, StoreError};
use quay_supervisor::{LogLine, ProcessSpec, ProcessSupervisor, SupervisorError};
use quay_types::{
    EnvPayload, Release, ReleaseChange, ReleaseId, ReleaseMetadata, RuntimeState, RuntimeStatus,
    Service, ServiceEvent, ServiceName, ServiceView, MANIFEST_FILE,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, instrument, warn};

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on extracting a bundle before start
    pub extract_timeout: Duration,

    /// Upper bound on dependency installation
    pub install_timeout: Duration,

    /// Entry point used when the manifest declares no `main`
    pub default_entry_point: String,

    /// Delete unreferenced bundles when loading the registry
    pub sweep_orphans: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extract_timeout: Duration::from_secs(60),
            install_timeout: Duration::from_secs(300),
            default_entry_point: "index.js".to_string(),
            sweep_orphans: true,
        }
    }
}

/// Collaborators the engine is built from
pub struct EngineComponents {
    pub layout: DataLayout,
    pub bundles: Arc<dyn BundleStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub supervisor: Arc<dyn ProcessSupervisor>,
    pub installer: Arc<dyn DependencyInstaller>,
    pub events: Arc<dyn EventPublisher>,
}

/// Coordinates registry, storage, supervisor and observers
pub struct DeploymentEngine {
    registry: ReleaseRegistry,
    layout: DataLayout,
    bundles: Arc<dyn BundleStore>,
    metadata: Arc<dyn MetadataStore>,
    supervisor: Arc<dyn ProcessSupervisor>,
    installer: Arc<dyn DependencyInstaller>,
    events: Arc<dyn EventPublisher>,
    config: EngineConfig,
    /// Serializes service creation
    create_lock: Mutex<()>,
}

impl DeploymentEngine {
    /// Load the registry from storage and build the engine
    pub async fn open(components: EngineComponents, config: EngineConfig) -> Result<Self> {
        let registry = ReleaseRegistry::load(
            components.metadata.as_ref(),
            components.bundles.as_ref(),
            config.sweep_orphans,
        )
        .await?;
        Ok(Self::new(registry, components, config))
    }

    /// Build the engine around an existing registry
    pub fn new(registry: ReleaseRegistry, components: EngineComponents, config: EngineConfig) -> Self {
        Self {
            registry,
            layout: components.layout,
            bundles: components.bundles,
            metadata: components.metadata,
            supervisor: components.supervisor,
            installer: components.installer,
            events: components.events,
            config,
            create_lock: Mutex::new(()),
        }
    }

    /// Read access to the registry
    pub fn registry(&self) -> &ReleaseRegistry {
        &self.registry
    }

    fn slot(&self, service: &str) -> Result<Arc<ServiceSlot>> {
        ServiceName::parse(service)
            .ok()
            .and_then(|name| self.registry.slot(&name))
            .ok_or_else(|| DeploymentError::ServiceNotFound(service.to_string()))
    }

    fn release_id(service: &ServiceName, release: &str) -> Result<ReleaseId> {
        release
            .parse()
            .map_err(|_| DeploymentError::ReleaseNotFound {
                service: service.to_string(),
                release: release.to_string(),
            })
    }

    fn ensure_not_starting(slot: &ServiceSlot) -> Result<()> {
        if slot.is_starting() {
            return Err(DeploymentError::StartInProgress(slot.name().to_string()));
        }
        Ok(())
    }

    /// Apply a change to a copy, persist it, commit it and publish
    async fn mutate<T>(
        &self,
        slot: &ServiceSlot,
        change: impl FnOnce(&mut Service) -> Result<T>,
        event: impl FnOnce(&Service, &T) -> ServiceEvent,
    ) -> Result<T> {
        let mut current = slot.lock().await;
        let mut next = current.clone();
        let outcome = change(&mut next)?;

        self.metadata.save(slot.name(), &next.to_meta()).await?;
        *current = next;

        self.events.publish(event(&current, &outcome));
        Ok(outcome)
    }

    // ----- Services -----

    /// Create a new service with an initial environment
    #[instrument(skip(self, env), fields(service = %name))]
    pub async fn create_service(
        &self,
        name: &str,
        env: BTreeMap<String, String>,
    ) -> Result<ServiceView> {
        let name = ServiceName::parse(name)?;
        let _creating = self.create_lock.lock().await;

        if self.registry.contains(&name) {
            return Err(DeploymentError::AlreadyExists(name.to_string()));
        }

        let service = Service::new(name.clone(), env);
        self.metadata.save(&name, &service.to_meta()).await?;

        let view = service.view(RuntimeState::Stopped);
        self.registry.insert(service);

        info!("Service created");
        Ok(view)
    }

    /// Every service, sorted by name
    pub async fn services(&self) -> Vec<ServiceView> {
        self.registry.views().await
    }

    pub async fn service(&self, name: &str) -> Result<ServiceView> {
        let slot = self.slot(name)?;
        let service = slot.lock().await;
        Ok(service.view(slot.status().status))
    }

    // ----- Releases -----

    /// Store an uploaded bundle as a new release and make it active
    #[instrument(skip(self, bytes), fields(service = %service, size = bytes.len()))]
    pub async fn add_release(&self, service: &str, bytes: Vec<u8>) -> Result<Release> {
        let slot = self.slot(service)?;
        let name = slot.name().clone();
        let id = ReleaseId::generate();

        // 1. Validate and store the bundle
        let bundle = self.bundles.put(&name, &id, bytes).await?;

        // 2. Read the manifest, best effort
        let metadata = match self.bundles.read_entry(&name, &bundle, MANIFEST_FILE).await {
            Ok(Some(raw)) => ReleaseMetadata::from_manifest_bytes(&raw),
            Ok(None) => ReleaseMetadata::Absent,
            Err(e) => {
                warn!(release_id = %id, error = %e, "Failed to read release manifest");
                ReleaseMetadata::Absent
            }
        };
        let release = Release::new(id, bundle.clone(), metadata);

        // 3. Append, activate, persist, commit, publish
        let added = release.clone();
        let result = self
            .mutate(
                &slot,
                |svc| {
                    svc.push_release(added);
                    Ok(())
                },
                |svc, _| ServiceEvent::Release {
                    service: svc.name.clone(),
                    data: ReleaseChange::Added {
                        release: release.clone(),
                    },
                },
            )
            .await;

        if let Err(e) = result {
            if let Err(cleanup) = self.bundles.delete(&name, &bundle).await {
                warn!(release_id = %id, error = %cleanup, "Failed to remove unreferenced bundle");
            }
            return Err(e);
        }

        info!(release_id = %id, parsed_manifest = release.metadata.is_parsed(), "Release added");
        Ok(release)
    }

    /// Releases in storage order
    pub async fn list_releases(&self, service: &str) -> Result<Vec<Release>> {
        let slot = self.slot(service)?;
        let service = slot.lock().await;
        Ok(service.releases.clone())
    }

    /// Point the service at an existing release
    #[instrument(skip(self), fields(service = %service, release_id = %release))]
    pub async fn activate_release(&self, service: &str, release: &str) -> Result<ReleaseId> {
        let slot = self.slot(service)?;
        let id = Self::release_id(slot.name(), release)?;

        self.mutate(
            &slot,
            |svc| {
                if svc.activate(&id) {
                    Ok(id)
                } else {
                    Err(DeploymentError::ReleaseNotFound {
                        service: svc.name.to_string(),
                        release: id.to_string(),
                    })
                }
            },
            |svc, id| ServiceEvent::Release {
                service: svc.name.clone(),
                data: ReleaseChange::Activated {
                    active_release_id: *id,
                },
            },
        )
        .await?;

        info!("Release activated");
        Ok(id)
    }

    /// Delete a release and its bundle, returning the resulting active release
    #[instrument(skip(self), fields(service = %service, release_id = %release))]
    pub async fn delete_release(&self, service: &str, release: &str) -> Result<Option<ReleaseId>> {
        let slot = self.slot(service)?;
        let id = Self::release_id(slot.name(), release)?;

        let (removed, active) = self
            .mutate(
                &slot,
                |svc| {
                    let removed = svc.remove_release(&id).ok_or_else(|| {
                        DeploymentError::ReleaseNotFound {
                            service: svc.name.to_string(),
                            release: id.to_string(),
                        }
                    })?;
                    Ok((removed, svc.active_release_id))
                },
                |svc, (removed, active)| ServiceEvent::Release {
                    service: svc.name.clone(),
                    data: ReleaseChange::Deleted {
                        deleted_release_id: removed.id,
                        active_release_id: *active,
                    },
                },
            )
            .await?;

        if let Err(e) = self.bundles.delete(slot.name(), &removed.filename).await {
            warn!(error = %e, "Failed to remove release bundle");
        }

        info!(active_release_id = ?active.map(|a| a.to_string()), "Release deleted");
        Ok(active)
    }

    // ----- Environment -----

    /// Replace the service environment
    ///
    /// A running process keeps its environment until it is started again.
    #[instrument(skip(self, env), fields(service = %service, vars = env.len()))]
    pub async fn update_env(
        &self,
        service: &str,
        env: BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>> {
        let slot = self.slot(service)?;

        let env = self
            .mutate(
                &slot,
                |svc| {
                    svc.env = env;
                    Ok(svc.env.clone())
                },
                |svc, env| ServiceEvent::Env {
                    service: svc.name.clone(),
                    data: EnvPayload { env: env.clone() },
                },
            )
            .await?;

        info!("Environment updated");
        Ok(env)
    }

    // ----- Runtime -----

    /// Record a new runtime status and tell observers, under the service lock
    async fn commit_status(&self, slot: &ServiceSlot, status: RuntimeStatus) -> RuntimeStatus {
        let _service = slot.lock().await;
        slot.set_status(status.clone());
        self.events.publish(ServiceEvent::Status {
            service: slot.name().clone(),
            data: status.clone(),
        });
        status
    }

    async fn snapshot(&self, name: &ServiceName) -> Option<serde_json::Value> {
        self.supervisor
            .describe(name.as_str())
            .await
            .map(|desc| desc.snapshot())
    }

    /// Extract, install and start the active release
    #[instrument(skip(self), fields(service = %service))]
    pub async fn start_service(&self, service: &str) -> Result<RuntimeStatus> {
        let slot = self.slot(service)?;
        let name = slot.name().clone();
        let _starting = slot
            .try_begin_start()
            .ok_or_else(|| DeploymentError::StartInProgress(name.to_string()))?;

        // 1. Snapshot the active release and environment
        let (release, env) = {
            let svc = slot.lock().await;
            let release = svc
                .active_release()
                .cloned()
                .ok_or_else(|| DeploymentError::NoActiveRelease(name.to_string()))?;
            (release, svc.env.clone())
        };

        // 2. Extract into a fresh working directory
        let attempt = uuid::Uuid::new_v4().simple().to_string();
        let working_dir = self.layout.run_dir(&name, &release.id, &attempt[..8]);
        tokio::time::timeout(
            self.config.extract_timeout,
            self.bundles.extract(&name, &release.filename, &working_dir),
        )
        .await
        .map_err(|_| {
            DeploymentError::DependencyInstallFailed(format!(
                "extraction timed out after {:?}",
                self.config.extract_timeout
            ))
        })??;

        // 3. Install dependencies
        if tokio::fs::try_exists(working_dir.join(MANIFEST_FILE))
            .await
            .unwrap_or(false)
        {
            tokio::time::timeout(
                self.config.install_timeout,
                self.installer.install(&working_dir),
            )
            .await
            .map_err(|_| {
                DeploymentError::DependencyInstallFailed(format!(
                    "installation timed out after {:?}",
                    self.config.install_timeout
                ))
            })??;
        }

        // 4. Resolve the entry point
        let root = working_dir.clone();
        let default = self.config.default_entry_point.clone();
        let entry_point = tokio::task::spawn_blocking(move || {
            let declared = entrypoint::declared(&root, &default);
            entrypoint::resolve(&root, &declared)
        })
        .await
        .map_err(|e| DeploymentError::Storage(StoreError::Task(e.to_string())))?;
        if let EntryPoint::CaseInsensitive(path) = &entry_point {
            info!(entry_point = %path.display(), "Resolved entry point case-insensitively");
        }

        // 5. Replace any previous process
        let spec = ProcessSpec {
            name: name.to_string(),
            entry_point: entry_point.into_path(),
            working_dir,
            env,
        };
        let started = match self.supervisor.remove_if_exists(name.as_str()).await {
            Ok(()) => self.supervisor.start(spec).await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            warn!(error = %e, "Supervisor failed to start service");
            self.commit_status(&slot, RuntimeStatus::stopped()).await;
            return Err(e.into());
        }

        // 6. Record and publish
        let snapshot = self.snapshot(&name).await;
        let status = self
            .commit_status(&slot, RuntimeStatus::running(snapshot))
            .await;

        info!(release_id = %release.id, "Service started");
        Ok(status)
    }

    /// Stop the service's process and forget it
    ///
    /// Rejected while a start of the same service is in flight.
    #[instrument(skip(self), fields(service = %service))]
    pub async fn stop_service(&self, service: &str) -> Result<RuntimeStatus> {
        let slot = self.slot(service)?;
        Self::ensure_not_starting(&slot)?;
        let name = slot.name().as_str();

        match self.supervisor.stop(name).await {
            Ok(()) | Err(SupervisorError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.supervisor.remove_if_exists(name).await?;

        let status = self.commit_status(&slot, RuntimeStatus::stopped()).await;
        info!("Service stopped");
        Ok(status)
    }

    /// Restart the service's process with its current spec
    #[instrument(skip(self), fields(service = %service))]
    pub async fn restart_service(&self, service: &str) -> Result<RuntimeStatus> {
        let slot = self.slot(service)?;
        Self::ensure_not_starting(&slot)?;
        self.supervisor.restart(slot.name().as_str()).await?;

        let snapshot = self.snapshot(slot.name()).await;
        let status = self
            .commit_status(&slot, RuntimeStatus::running(snapshot))
            .await;
        info!("Service restarted");
        Ok(status)
    }

    /// Live status from the supervisor, written back to the cached status
    ///
    /// A process the supervisor no longer knows is reported `stopped`. A
    /// `status` event is published only when the state changed.
    #[instrument(skip(self), fields(service = %service))]
    pub async fn service_status(&self, service: &str) -> Result<RuntimeStatus> {
        let slot = self.slot(service)?;
        let live = match self.supervisor.describe(slot.name().as_str()).await {
            Some(desc) => RuntimeStatus::with_state(desc.state, Some(desc.snapshot())),
            None => RuntimeStatus::stopped(),
        };

        let _service = slot.lock().await;
        let previous = slot.status().status;
        slot.set_status(live.clone());
        if previous != live.status {
            debug!(from = %previous, to = %live.status, "Runtime status changed");
            self.events.publish(ServiceEvent::Status {
                service: slot.name().clone(),
                data: live.clone(),
            });
        }
        Ok(live)
    }

    // ----- Logs -----

    pub fn recent_logs(&self, service: &str, tail: usize) -> Result<Vec<LogLine>> {
        let slot = self.slot(service)?;
        Ok(self.supervisor.recent_logs(slot.name().as_str(), tail))
    }

    pub fn clear_logs(&self, service: &str) -> Result<()> {
        let slot = self.slot(service)?;
        self.supervisor.clear_logs(slot.name().as_str());
        Ok(())
    }

    pub fn subscribe_logs(&self, service: &str) -> Result<broadcast::Receiver<LogLine>> {
        let slot = self.slot(service)?;
        Ok(self.supervisor.subscribe_logs(slot.name().as_str()))
    }

    /// Stop every supervised process
    pub async fn shutdown(&self) {
        info!("Stopping supervised processes");
        self.supervisor.shutdown().await;
    }
}
