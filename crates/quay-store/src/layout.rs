//! Data directory layout

use quay_types::{BundleRef, ReleaseId, ServiceName};
use std::path::{Path, PathBuf};

/// Name of the per-service metadata document
pub const METADATA_FILE: &str = "releases.json";

/// Per-service directory holding bundle archives
pub const RELEASES_DIR: &str = "releases";

/// Per-service directory holding extracted working trees
pub const RUN_DIR: &str = "run";

/// Paths of everything Quay keeps under its data directory
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn service_dir(&self, service: &ServiceName) -> PathBuf {
        self.root.join(service.as_str())
    }

    pub fn metadata_path(&self, service: &ServiceName) -> PathBuf {
        self.service_dir(service).join(METADATA_FILE)
    }

    pub fn releases_dir(&self, service: &ServiceName) -> PathBuf {
        self.service_dir(service).join(RELEASES_DIR)
    }

    pub fn bundle_path(&self, service: &ServiceName, bundle: &BundleRef) -> PathBuf {
        self.releases_dir(service).join(bundle.as_str())
    }

    /// A fresh working directory for one start attempt of a release
    pub fn run_dir(&self, service: &ServiceName, release: &ReleaseId, attempt: &str) -> PathBuf {
        self.service_dir(service)
            .join(RUN_DIR)
            .join(format!("{}-{}", release, attempt))
    }
}
