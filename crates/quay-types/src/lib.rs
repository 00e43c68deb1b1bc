//! Quay Types - Core types for the release lifecycle
//!
//! Quay is a minimal multi-tenant deployment controller. It accepts versioned
//! application bundles ("releases") for named services, tracks which release
//! is active, and drives a process supervisor to run it.
//!
//! ## Key Concepts
//!
//! - **Service**: A named deployable unit with its own environment and release history
//! - **Release**: An immutable, uniquely identified bundle plus parsed metadata
//! - **Active release**: The release the supervisor uses on next start
//! - **RuntimeStatus**: Transient, supervisor-derived process state
//! - **ServiceEvent**: State changes fanned out to connected observers

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod events;
pub mod ids;
pub mod release;
pub mod runtime;
pub mod service;

// Re-export main types
pub use events::{EnvPayload, InitialSnapshot, ReleaseChange, ServiceEvent};
pub use ids::{BundleRef, InvalidServiceName, ReleaseId, ServiceName, MAX_SERVICE_NAME_LEN};
pub use release::{PackageManifest, Release, ReleaseMetadata, MANIFEST_FILE};
pub use runtime::{RuntimeState, RuntimeStatus};
pub use service::{Service, ServiceMeta, ServiceView};
