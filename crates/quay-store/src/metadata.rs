//! Metadata store - per-service durable record
//!
//! Each service has one JSON document holding its env, release list and
//! active-release pointer. Saves write a sibling temp file, fsync it and
//! rename it over the document, so readers see either the old or the new
//! version and never a partial one.

use crate::blocking;
use crate::error::{Result, StoreError};
use crate::layout::DataLayout;
use async_trait::async_trait;
use quay_types::{ServiceMeta, ServiceName};
use std::io::Write;
use tracing::{debug, instrument};

/// Durable storage for service metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Load a service's metadata document
    ///
    /// Returns `NotFound` when the service has no document and
    /// `Serialization` when the document does not parse.
    async fn load(&self, service: &ServiceName) -> Result<ServiceMeta>;

    /// Atomically replace a service's metadata document
    async fn save(&self, service: &ServiceName, meta: &ServiceMeta) -> Result<()>;

    /// Names of every service directory, unvalidated
    async fn list_service_names(&self) -> Result<Vec<String>>;
}

/// Filesystem-backed metadata store
#[derive(Debug, Clone)]
pub struct FsMetadataStore {
    layout: DataLayout,
}

impl FsMetadataStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn load(&self, service: &ServiceName) -> Result<ServiceMeta> {
        let path = self.layout.metadata_path(service);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(format!("metadata for {}", service)));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    #[instrument(skip(self, meta), fields(service = %service, releases = meta.releases.len()))]
    async fn save(&self, service: &ServiceName, meta: &ServiceMeta) -> Result<()> {
        let dir = self.layout.service_dir(service);
        let path = self.layout.metadata_path(service);
        let document = serde_json::to_vec_pretty(meta)?;

        blocking(move || {
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::Builder::new()
                .prefix(".releases.json.")
                .tempfile_in(&dir)?;
            tmp.write_all(&document)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            sync_dir(&dir);
            Ok(())
        })
        .await?;

        debug!("Saved service metadata");
        Ok(())
    }

    async fn list_service_names(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.layout.root()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Persist the rename itself; best effort where directories cannot be opened
fn sync_dir(dir: &std::path::Path) {
    #[cfg(unix)]
    if let Ok(handle) = std::fs::File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}
