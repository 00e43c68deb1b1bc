//! Service entity and its durable projection
//!
//! `Service` carries the release-pointer policy: every appended release
//! becomes active, and deleting the active release hands the pointer to the
//! last remaining release in storage order.

use crate::{Release, ReleaseId, RuntimeState, ServiceName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named deployable unit with its own environment and release history
#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: ServiceName,
    pub env: BTreeMap<String, String>,
    pub releases: Vec<Release>,
    pub active_release_id: Option<ReleaseId>,
}

impl Service {
    /// Create an empty service
    pub fn new(name: ServiceName, env: BTreeMap<String, String>) -> Self {
        Self {
            name,
            env,
            releases: Vec::new(),
            active_release_id: None,
        }
    }

    /// Rebuild a service from its persisted projection
    ///
    /// An active pointer that references no release is dropped.
    pub fn from_meta(name: ServiceName, meta: ServiceMeta) -> Self {
        let mut service = Self {
            name,
            env: meta.env,
            releases: meta.releases,
            active_release_id: meta.active_release_id,
        };
        if let Some(id) = service.active_release_id {
            if service.release(&id).is_none() {
                service.active_release_id = None;
            }
        }
        service
    }

    /// The durable projection of this service
    pub fn to_meta(&self) -> ServiceMeta {
        ServiceMeta {
            env: self.env.clone(),
            releases: self.releases.clone(),
            active_release_id: self.active_release_id,
        }
    }

    pub fn release(&self, id: &ReleaseId) -> Option<&Release> {
        self.releases.iter().find(|r| &r.id == id)
    }

    pub fn active_release(&self) -> Option<&Release> {
        self.active_release_id.and_then(|id| self.release(&id))
    }

    /// Append a release and make it active
    pub fn push_release(&mut self, release: Release) {
        self.active_release_id = Some(release.id);
        self.releases.push(release);
    }

    /// Point the service at an existing release; false if it is unknown
    pub fn activate(&mut self, id: &ReleaseId) -> bool {
        if self.release(id).is_none() {
            return false;
        }
        self.active_release_id = Some(*id);
        true
    }

    /// Remove a release, reassigning the active pointer if it was active
    pub fn remove_release(&mut self, id: &ReleaseId) -> Option<Release> {
        let index = self.releases.iter().position(|r| &r.id == id)?;
        let removed = self.releases.remove(index);
        if self.active_release_id == Some(removed.id) {
            self.active_release_id = self.releases.last().map(|r| r.id);
        }
        Some(removed)
    }

    /// Read-only view combined with the cached runtime state
    pub fn view(&self, status: RuntimeState) -> ServiceView {
        ServiceView {
            name: self.name.clone(),
            env: self.env.clone(),
            releases: self.releases.clone(),
            active_release_id: self.active_release_id,
            status,
            active_release: self.active_release().cloned(),
        }
    }
}

/// Persisted metadata document for one service (`releases.json`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMeta {
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub releases: Vec<Release>,

    #[serde(default)]
    pub active_release_id: Option<ReleaseId>,
}

/// Service as reported to API clients and observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub name: ServiceName,
    pub env: BTreeMap<String, String>,
    pub releases: Vec<Release>,
    pub active_release_id: Option<ReleaseId>,
    pub status: RuntimeState,
    pub active_release: Option<Release>,
}
