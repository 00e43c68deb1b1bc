//! Release registry - in-memory view of every service
//!
//! The registry is rebuilt from the metadata store at startup and afterwards
//! only changed by the engine. Each service lives in its own slot so that
//! services never contend with each other.

use crate::error::Result;
use dashmap::DashMap;
use quay_store::{BundleStore, MetadataStore, StoreError};
use quay_types::{
    BundleRef, ReleaseId, RuntimeStatus, Service, ServiceMeta, ServiceName, ServiceView,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

/// One service: committed state, cached runtime status, start flag
pub(crate) struct ServiceSlot {
    name: ServiceName,
    service: Mutex<Service>,
    status: RwLock<RuntimeStatus>,
    starting: AtomicBool,
}

impl ServiceSlot {
    fn new(service: Service) -> Self {
        Self {
            name: service.name.clone(),
            service: Mutex::new(service),
            status: RwLock::new(RuntimeStatus::stopped()),
            starting: AtomicBool::new(false),
        }
    }

    pub(crate) fn name(&self) -> &ServiceName {
        &self.name
    }

    /// Take the per-service lock
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Service> {
        self.service.lock().await
    }

    pub(crate) fn status(&self) -> RuntimeStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub(crate) fn set_status(&self, status: RuntimeStatus) {
        if let Ok(mut current) = self.status.write() {
            *current = status;
        }
    }

    pub(crate) fn is_starting(&self) -> bool {
        self.starting.load(Ordering::Acquire)
    }

    /// Claim the start flag; `None` if a start is already running
    pub(crate) fn try_begin_start(self: &Arc<Self>) -> Option<StartGuard> {
        self.starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StartGuard { slot: self.clone() })
    }

    async fn view(&self) -> ServiceView {
        let service = self.service.lock().await;
        service.view(self.status().status)
    }
}

/// Clears the start flag when dropped
pub(crate) struct StartGuard {
    slot: Arc<ServiceSlot>,
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        self.slot.starting.store(false, Ordering::Release);
    }
}

/// Registry of all known services
#[derive(Default)]
pub struct ReleaseRegistry {
    services: DashMap<ServiceName, Arc<ServiceSlot>>,
}

impl ReleaseRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the registry from durable storage
    ///
    /// Unparseable or missing metadata loads as an empty service; directories
    /// whose names are not valid service names are skipped. Releases whose
    /// bundle is gone are dropped and the repaired document is saved. Bundles
    /// that no release references are deleted when `sweep_orphans` is set.
    pub async fn load(
        metadata: &dyn MetadataStore,
        bundles: &dyn BundleStore,
        sweep_orphans: bool,
    ) -> Result<Self> {
        let registry = Self::new();

        for dir in metadata.list_service_names().await? {
            let name = match ServiceName::parse(dir.as_str()) {
                Ok(name) => name,
                Err(e) => {
                    warn!(dir = %dir, error = %e, "Skipping directory with invalid service name");
                    continue;
                }
            };

            let meta = match metadata.load(&name).await {
                Ok(meta) => meta,
                Err(StoreError::NotFound(_)) => {
                    warn!(service = %name, "No metadata found, loading service with defaults");
                    ServiceMeta::default()
                }
                Err(StoreError::Serialization(e)) => {
                    warn!(service = %name, error = %e, "Unreadable metadata, loading service with defaults");
                    ServiceMeta::default()
                }
                Err(e) => return Err(e.into()),
            };

            let mut repaired = false;
            if let Some(id) = meta.active_release_id {
                if !meta.releases.iter().any(|r| r.id == id) {
                    warn!(service = %name, release_id = %id, "Clearing dangling active release");
                    repaired = true;
                }
            }

            let mut service = Service::from_meta(name, meta);
            repaired |= reconcile_bundles(&mut service, bundles, sweep_orphans).await;
            if repaired {
                if let Err(e) = metadata.save(&service.name, &service.to_meta()).await {
                    warn!(service = %service.name, error = %e, "Failed to save repaired metadata");
                }
            }
            registry.insert(service);
        }

        info!(services = registry.len(), "Release registry loaded");
        Ok(registry)
    }

    /// Number of services
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn contains(&self, name: &ServiceName) -> bool {
        self.services.contains_key(name)
    }

    /// Service names in sorted order
    pub fn names(&self) -> Vec<ServiceName> {
        let mut names: Vec<ServiceName> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Committed view of one service
    pub async fn view(&self, name: &ServiceName) -> Option<ServiceView> {
        let slot = self.slot(name)?;
        Some(slot.view().await)
    }

    /// Committed views of every service, sorted by name
    pub async fn views(&self) -> Vec<ServiceView> {
        let mut slots: Vec<Arc<ServiceSlot>> =
            self.services.iter().map(|e| e.value().clone()).collect();
        slots.sort_by(|a, b| a.name.cmp(&b.name));

        let mut views = Vec::with_capacity(slots.len());
        for slot in slots {
            views.push(slot.view().await);
        }
        views
    }

    /// Cached runtime status of one service
    pub fn status(&self, name: &ServiceName) -> Option<RuntimeStatus> {
        self.slot(name).map(|slot| slot.status())
    }

    pub(crate) fn slot(&self, name: &ServiceName) -> Option<Arc<ServiceSlot>> {
        self.services.get(name).map(|e| e.value().clone())
    }

    /// Insert a service; returns false if the name is taken
    pub(crate) fn insert(&self, service: Service) -> bool {
        match self.services.entry(service.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(Arc::new(ServiceSlot::new(service)));
                true
            }
        }
    }
}

/// Compare stored bundles with the releases that reference them
///
/// Returns true if releases were dropped from `service`.
async fn reconcile_bundles(
    service: &mut Service,
    bundles: &dyn BundleStore,
    sweep_orphans: bool,
) -> bool {
    let stored = match bundles.list(&service.name).await {
        Ok(stored) => stored,
        Err(e) => {
            warn!(service = %service.name, error = %e, "Failed to list bundles");
            return false;
        }
    };

    let missing: Vec<ReleaseId> = service
        .releases
        .iter()
        .filter(|r| !stored.contains(&r.filename))
        .map(|r| r.id)
        .collect();
    for id in &missing {
        warn!(service = %service.name, release_id = %id, "Dropping release whose bundle is missing");
        service.remove_release(id);
    }

    let referenced: HashSet<&BundleRef> = service.releases.iter().map(|r| &r.filename).collect();

    for bundle in stored.iter().filter(|b| !referenced.contains(b)) {
        if !sweep_orphans {
            info!(service = %service.name, bundle = %bundle, "Found orphan bundle");
            continue;
        }
        match bundles.delete(&service.name, bundle).await {
            Ok(()) => info!(service = %service.name, bundle = %bundle, "Removed orphan bundle"),
            Err(e) => {
                warn!(service = %service.name, bundle = %bundle, error = %e, "Failed to remove orphan bundle")
            }
        }
    }

    !missing.is_empty()
}
