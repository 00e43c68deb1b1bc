//! Quay Deployment Engine
//!
//! Owns the release lifecycle of every service: ingestion of uploaded
//! bundles, the active-release pointer, environment configuration and the
//! start/stop/restart flow through the process supervisor.
//!
//! ## Architectural Boundaries
//!
//! - `quay-store` owns: bundle archives and durable metadata documents
//! - `quay-supervisor` owns: running processes and their output
//! - `quay-deployment` owns: the in-memory registry and the ordering of
//!   persist, commit and publish for every mutation
//!
//! ## Key Principle
//!
//! A mutation is durable before it is visible. The registry is only ever
//! changed by the engine, after the metadata store has accepted the new
//! document, and events are published while the service is still locked so
//! observers see changes in commit order.
//!
//! ## Usage
//!
//! ```no_run
//! use quay_deployment::{
//!     BroadcastPublisher, DeploymentEngine, EngineComponents, EngineConfig, NoopInstaller,
//! };
//! use quay_store::{DataLayout, FsBundleStore, FsMetadataStore};
//! use quay_supervisor::NativeSupervisor;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let layout = DataLayout::new("/var/lib/quay");
//! let components = EngineComponents {
//!     layout: layout.clone(),
//!     bundles: Arc::new(FsBundleStore::new(layout.clone())),
//!     metadata: Arc::new(FsMetadataStore::new(layout)),
//!     supervisor: Arc::new(NativeSupervisor::default()),
//!     installer: Arc::new(NoopInstaller),
//!     events: Arc::new(BroadcastPublisher::default()),
//! };
//!
//! let engine = DeploymentEngine::open(components, EngineConfig::default()).await?;
//! engine.create_service("web", Default::default()).await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod engine;
pub mod entrypoint;
pub mod error;
pub mod events;
pub mod install;
pub mod registry;

// Re-exports
pub use engine::{DeploymentEngine, EngineComponents, EngineConfig};
pub use entrypoint::EntryPoint;
pub use error::{DeploymentError, Result};
pub use events::{BroadcastPublisher, EventPublisher};
pub use install::{CommandInstaller, DependencyInstaller, NoopInstaller};
pub use registry::ReleaseRegistry;
