//! Entry-point resolution inside an extracted release
//!
//! The declared entry point is the manifest's `main`, or a configured
//! default. Archives built on case-insensitive filesystems often disagree
//! with their manifest on case, so an exact match is tried first and then a
//! case-insensitive scan of the tree.

use quay_types::{PackageManifest, MANIFEST_FILE};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Installed dependencies are never entry points
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git"];

/// Outcome of resolving an entry point, relative to the release root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// The declared path exists as written
    Exact(PathBuf),
    /// A file matching the declared path case-insensitively
    CaseInsensitive(PathBuf),
    /// Nothing matched; the declared path is passed through
    Unresolved(PathBuf),
}

impl EntryPoint {
    pub fn path(&self) -> &Path {
        match self {
            Self::Exact(p) | Self::CaseInsensitive(p) | Self::Unresolved(p) => p,
        }
    }

    pub fn into_path(self) -> PathBuf {
        match self {
            Self::Exact(p) | Self::CaseInsensitive(p) | Self::Unresolved(p) => p,
        }
    }
}

/// The entry point declared by the extracted manifest, or `default`
pub fn declared(root: &Path, default: &str) -> String {
    std::fs::read(root.join(MANIFEST_FILE))
        .ok()
        .and_then(|raw| serde_json::from_slice::<PackageManifest>(&raw).ok())
        .and_then(|manifest| manifest.main)
        .filter(|main| !main.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Resolve `declared` against the tree under `root`
///
/// Runs synchronously over the filesystem.
pub fn resolve(root: &Path, declared: &str) -> EntryPoint {
    let wanted = normalize(Path::new(declared));
    if root.join(&wanted).is_file() {
        return EntryPoint::Exact(wanted);
    }

    let wanted_key = key(&wanted);
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && SKIPPED_DIRS.iter().any(|d| e.file_name() == *d))
        });

    for entry in walker.filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if key(relative) == wanted_key {
            return EntryPoint::CaseInsensitive(relative.to_path_buf());
        }
    }

    warn!(entry_point = %wanted.display(), "Entry point not found in release, using declared path");
    EntryPoint::Unresolved(wanted)
}

/// Keep only plain components so the path stays inside the release root
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

fn key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}
