//! Quay Store - Durable storage for bundles and service metadata
//!
//! Two stores share one data directory:
//!
//! - **BundleStore**: immutable release archives (gzip-compressed tar),
//!   addressed by release ID, plus extraction and single-entry reads
//! - **MetadataStore**: one `releases.json` document per service, replaced
//!   atomically on every save
//!
//! ## On-disk layout
//!
//! ```text
//! <data_dir>/<service>/releases.json
//! <data_dir>/<service>/releases/<release-id>.tgz
//! <data_dir>/<service>/run/<release-id>-<attempt>/
//! ```
//!
//! `save` is the durability boundary: nothing is committed until it returns.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod archive;
pub mod bundle;
pub mod error;
pub mod layout;
pub mod memory;
pub mod metadata;

// Re-exports
pub use bundle::{BundleStore, FsBundleStore};
pub use error::{Result, StoreError};
pub use layout::DataLayout;
pub use memory::{InMemoryBundleStore, InMemoryMetadataStore};
pub use metadata::{FsMetadataStore, MetadataStore};

/// Run blocking filesystem work off the async executor
pub(crate) async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
