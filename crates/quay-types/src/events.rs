//! Observer event types
//!
//! Events are serialized as `{ "type": ..., "service": ..., "data": {...} }`
//! and fanned out to every connected observer.

use crate::{Release, ReleaseId, RuntimeStatus, ServiceName, ServiceView};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A state change visible to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServiceEvent {
    /// Runtime status changed
    Status {
        service: ServiceName,
        data: RuntimeStatus,
    },

    /// Environment replaced
    Env {
        service: ServiceName,
        data: EnvPayload,
    },

    /// Release added, activated or deleted
    Release {
        service: ServiceName,
        data: ReleaseChange,
    },

    /// Full state snapshot sent to a newly connected observer
    Initial { data: InitialSnapshot },
}

impl ServiceEvent {
    /// Service the event concerns; `None` for snapshots
    pub fn service(&self) -> Option<&ServiceName> {
        match self {
            Self::Status { service, .. }
            | Self::Env { service, .. }
            | Self::Release { service, .. } => Some(service),
            Self::Initial { .. } => None,
        }
    }

    /// Wire name of the event type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Env { .. } => "env",
            Self::Release { .. } => "release",
            Self::Initial { .. } => "initial",
        }
    }
}

/// Payload of `env` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvPayload {
    pub env: BTreeMap<String, String>,
}

/// Payload of `release` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReleaseChange {
    /// A release was uploaded (and became active)
    Added { release: Release },

    /// A release was deleted; carries the resulting active pointer
    Deleted {
        #[serde(rename = "deletedReleaseId")]
        deleted_release_id: ReleaseId,
        #[serde(rename = "activeReleaseId")]
        active_release_id: Option<ReleaseId>,
    },

    /// The active pointer moved
    Activated {
        #[serde(rename = "activeReleaseId")]
        active_release_id: ReleaseId,
    },
}

/// Payload of `initial` events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialSnapshot {
    pub services: Vec<ServiceView>,
}
