//! Bundle store - immutable release archives
//!
//! Bundles are gzip-compressed tar archives stored under the name of the
//! release they belong to. They are validated before being written and never
//! modified afterwards.

use crate::archive;
use crate::blocking;
use crate::error::{Result, StoreError};
use crate::layout::DataLayout;
use async_trait::async_trait;
use quay_types::{BundleRef, ReleaseId, ServiceName};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Storage for release bundles
#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Validate and durably store a bundle for a release
    async fn put(
        &self,
        service: &ServiceName,
        release: &ReleaseId,
        bytes: Vec<u8>,
    ) -> Result<BundleRef>;

    /// Extract the full bundle into `target` (created if missing)
    async fn extract(&self, service: &ServiceName, bundle: &BundleRef, target: &Path) -> Result<()>;

    /// Remove a bundle; removing a missing bundle succeeds
    async fn delete(&self, service: &ServiceName, bundle: &BundleRef) -> Result<()>;

    /// Read one archive entry without extracting, `None` if absent
    async fn read_entry(
        &self,
        service: &ServiceName,
        bundle: &BundleRef,
        entry_path: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// List the bundles stored for a service
    async fn list(&self, service: &ServiceName) -> Result<Vec<BundleRef>>;
}

/// Reject references that would resolve outside the releases directory
pub(crate) fn check_ref(bundle: &BundleRef) -> Result<()> {
    if bundle.is_plain_file_name() {
        Ok(())
    } else {
        Err(StoreError::InvalidBundle(format!(
            "invalid bundle reference: {}",
            bundle
        )))
    }
}

/// Filesystem-backed bundle store
#[derive(Debug, Clone)]
pub struct FsBundleStore {
    layout: DataLayout,
}

impl FsBundleStore {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    fn path_for(&self, service: &ServiceName, bundle: &BundleRef) -> Result<PathBuf> {
        check_ref(bundle)?;
        Ok(self.layout.bundle_path(service, bundle))
    }
}

#[async_trait]
impl BundleStore for FsBundleStore {
    #[instrument(skip(self, bytes), fields(service = %service, release_id = %release, size = bytes.len()))]
    async fn put(
        &self,
        service: &ServiceName,
        release: &ReleaseId,
        bytes: Vec<u8>,
    ) -> Result<BundleRef> {
        let bundle = BundleRef::for_release(release);
        let dir = self.layout.releases_dir(service);
        let path = self.path_for(service, &bundle)?;

        blocking(move || {
            archive::validate(&bytes)?;
            std::fs::create_dir_all(&dir)?;
            let mut tmp = tempfile::Builder::new()
                .prefix(".upload-")
                .tempfile_in(&dir)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await?;

        debug!(bundle = %bundle, "Stored bundle");
        Ok(bundle)
    }

    #[instrument(skip(self), fields(service = %service, bundle = %bundle))]
    async fn extract(&self, service: &ServiceName, bundle: &BundleRef, target: &Path) -> Result<()> {
        let path = self.path_for(service, bundle)?;
        let target = target.to_path_buf();
        let name = bundle.to_string();

        blocking(move || {
            let file = open_bundle(&path, &name)?;
            archive::unpack(std::io::BufReader::new(file), &target)
        })
        .await
    }

    async fn delete(&self, service: &ServiceName, bundle: &BundleRef) -> Result<()> {
        let path = self.path_for(service, bundle)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(service = %service, bundle = %bundle, "Deleted bundle");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_entry(
        &self,
        service: &ServiceName,
        bundle: &BundleRef,
        entry_path: &str,
    ) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(service, bundle)?;
        let entry_path = entry_path.to_string();
        let name = bundle.to_string();

        blocking(move || {
            let file = open_bundle(&path, &name)?;
            archive::read_entry(std::io::BufReader::new(file), &entry_path)
        })
        .await
    }

    async fn list(&self, service: &ServiceName) -> Result<Vec<BundleRef>> {
        let dir = self.layout.releases_dir(service);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut bundles = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(BundleRef::EXTENSION) && !name.starts_with('.') {
                bundles.push(BundleRef::new(name));
            }
        }
        bundles.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(bundles)
    }
}

fn open_bundle(path: &Path, name: &str) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::NotFound(format!("bundle {}", name)),
        _ => StoreError::Io(e),
    })
}
