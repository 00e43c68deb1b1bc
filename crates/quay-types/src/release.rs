//! Release types
//!
//! A release is an immutable uploaded bundle plus the display metadata read
//! from its package manifest. Manifest parsing is opportunistic: a bundle
//! without a usable manifest still becomes a release, with
//! [`ReleaseMetadata::Absent`].

use crate::{BundleRef, ReleaseId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// File name of the package manifest at the bundle root
pub const MANIFEST_FILE: &str = "package.json";

/// An uploaded, immutable release of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Unique release identifier
    pub id: ReleaseId,

    /// Bundle archive in the bundle store
    pub filename: BundleRef,

    /// Upload timestamp
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Parsed manifest, or absent
    #[serde(default)]
    pub metadata: ReleaseMetadata,
}

impl Release {
    /// Create a release record for a freshly stored bundle
    pub fn new(id: ReleaseId, filename: BundleRef, metadata: ReleaseMetadata) -> Self {
        Self {
            id,
            filename,
            created_at: chrono::Utc::now(),
            metadata,
        }
    }
}

/// Package manifest descriptor (`package.json`)
///
/// Only the fields Quay reads are typed; everything else in the document is
/// preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Entry point, relative to the bundle root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PackageManifest {
    /// The `scripts.start` command, if declared
    pub fn start_script(&self) -> Option<&str> {
        self.scripts.get("start").map(String::as_str)
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.version.is_none()
            && self.description.is_none()
            && self.main.is_none()
            && self.scripts.is_empty()
            && self.extra.is_empty()
    }
}

/// Best-effort release metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReleaseMetadata {
    /// The manifest was present and parsed
    Parsed(PackageManifest),

    /// No manifest, or it could not be parsed
    #[default]
    Absent,
}

impl ReleaseMetadata {
    /// Parse manifest bytes; any failure yields [`ReleaseMetadata::Absent`]
    pub fn from_manifest_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice::<PackageManifest>(bytes) {
            Ok(manifest) => Self::Parsed(manifest),
            Err(_) => Self::Absent,
        }
    }

    pub fn manifest(&self) -> Option<&PackageManifest> {
        match self {
            Self::Parsed(manifest) => Some(manifest),
            Self::Absent => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }

    /// Declared entry point
    pub fn main(&self) -> Option<&str> {
        self.manifest().and_then(|m| m.main.as_deref())
    }
}

// Persisted as the manifest object itself, or `{}` when absent.
impl Serialize for ReleaseMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Parsed(manifest) => manifest.serialize(serializer),
            Self::Absent => serde_json::Map::new().serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ReleaseMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        let metadata = match serde_json::from_value::<PackageManifest>(value) {
            Ok(manifest) if !manifest.is_empty() => Self::Parsed(manifest),
            _ => Self::Absent,
        };
        Ok(metadata)
    }
}
