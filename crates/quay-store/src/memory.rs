//! In-memory implementations of the store traits
//!
//! These are suitable for development and testing. Extraction still writes
//! to the real filesystem, since the extracted tree is handed to a process.

use crate::archive;
use crate::blocking;
use crate::bundle::{check_ref, BundleStore};
use crate::error::{Result, StoreError};
use crate::metadata::MetadataStore;
use async_trait::async_trait;
use dashmap::DashMap;
use quay_types::{BundleRef, ReleaseId, ServiceMeta, ServiceName};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory bundle store
#[derive(Default)]
pub struct InMemoryBundleStore {
    bundles: DashMap<(ServiceName, BundleRef), Arc<Vec<u8>>>,
}

impl InMemoryBundleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a bundle is currently stored
    pub fn contains(&self, service: &ServiceName, bundle: &BundleRef) -> bool {
        self.bundles
            .contains_key(&(service.clone(), bundle.clone()))
    }

    fn get(&self, service: &ServiceName, bundle: &BundleRef) -> Result<Arc<Vec<u8>>> {
        check_ref(bundle)?;
        self.bundles
            .get(&(service.clone(), bundle.clone()))
            .map(|b| b.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("bundle {}", bundle)))
    }
}

#[async_trait]
impl BundleStore for InMemoryBundleStore {
    async fn put(
        &self,
        service: &ServiceName,
        release: &ReleaseId,
        bytes: Vec<u8>,
    ) -> Result<BundleRef> {
        archive::validate(&bytes)?;
        let bundle = BundleRef::for_release(release);
        self.bundles
            .insert((service.clone(), bundle.clone()), Arc::new(bytes));
        Ok(bundle)
    }

    async fn extract(&self, service: &ServiceName, bundle: &BundleRef, target: &Path) -> Result<()> {
        let bytes = self.get(service, bundle)?;
        let target = target.to_path_buf();
        blocking(move || archive::unpack(&bytes[..], &target)).await
    }

    async fn delete(&self, service: &ServiceName, bundle: &BundleRef) -> Result<()> {
        check_ref(bundle)?;
        self.bundles.remove(&(service.clone(), bundle.clone()));
        Ok(())
    }

    async fn read_entry(
        &self,
        service: &ServiceName,
        bundle: &BundleRef,
        entry_path: &str,
    ) -> Result<Option<Vec<u8>>> {
        let bytes = self.get(service, bundle)?;
        archive::read_entry(&bytes[..], entry_path)
    }

    async fn list(&self, service: &ServiceName) -> Result<Vec<BundleRef>> {
        let mut bundles: Vec<BundleRef> = self
            .bundles
            .iter()
            .filter(|e| &e.key().0 == service)
            .map(|e| e.key().1.clone())
            .collect();
        bundles.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(bundles)
    }
}

/// In-memory metadata store
///
/// Documents are kept serialized so that corrupt documents can be injected
/// and saves exercise the same encoding as the filesystem store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    documents: DashMap<String, String>,
    fail_saves: AtomicBool,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw document, bypassing serialization
    pub fn insert_raw(&self, service: &str, document: impl Into<String>) {
        self.documents.insert(service.to_string(), document.into());
    }

    /// Make subsequent saves fail with an I/O error
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn load(&self, service: &ServiceName) -> Result<ServiceMeta> {
        let document = self
            .documents
            .get(service.as_str())
            .map(|d| d.value().clone())
            .ok_or_else(|| StoreError::NotFound(format!("metadata for {}", service)))?;
        Ok(serde_json::from_str(&document)?)
    }

    async fn save(&self, service: &ServiceName, meta: &ServiceMeta) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected save failure",
            )));
        }
        let document = serde_json::to_string_pretty(meta)?;
        self.documents.insert(service.to_string(), document);
        Ok(())
    }

    async fn list_service_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.documents.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}
