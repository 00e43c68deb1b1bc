//! Strongly-typed identifiers for Quay entities
//!
//! Release IDs are UUID-based; service names are validated strings that are
//! also used as directory names on disk, so they never contain separators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a service name
pub const MAX_SERVICE_NAME_LEN: usize = 63;

/// Name of a service: lowercase letters, digits and hyphens
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

/// Reasons a service name is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidServiceName {
    #[error("Service name must not be empty")]
    Empty,

    #[error("Service name exceeds {MAX_SERVICE_NAME_LEN} characters: {0}")]
    TooLong(String),

    #[error("Service name must contain only lowercase letters, numbers, and hyphens: {0}")]
    InvalidCharacters(String),
}

impl ServiceName {
    /// Validate and wrap a service name
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidServiceName> {
        let name = name.into();
        if name.is_empty() {
            return Err(InvalidServiceName::Empty);
        }
        if name.len() > MAX_SERVICE_NAME_LEN {
            return Err(InvalidServiceName::TooLong(name));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(InvalidServiceName::InvalidCharacters(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServiceName {
    type Error = InvalidServiceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> Self {
        name.0
    }
}

impl FromStr for ServiceName {
    type Err = InvalidServiceName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for ServiceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(Uuid);

impl ReleaseId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ReleaseId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a stored bundle: the archive file name inside a service's
/// release directory
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleRef(String);

impl BundleRef {
    /// File extension of stored bundles
    pub const EXTENSION: &'static str = ".tgz";

    /// The canonical bundle reference for a release
    pub fn for_release(id: &ReleaseId) -> Self {
        Self(format!("{}{}", id, Self::EXTENSION))
    }

    pub fn new(filename: impl Into<String>) -> Self {
        Self(filename.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The release this bundle was stored for, if the name is canonical
    pub fn release_id(&self) -> Option<ReleaseId> {
        self.0
            .strip_suffix(Self::EXTENSION)
            .and_then(|stem| stem.parse().ok())
    }

    /// Whether the name is a plain file name (no separators or parent refs)
    pub fn is_plain_file_name(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\\'])
    }
}

impl fmt::Display for BundleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_accepts_lowercase_alnum_hyphen() {
        assert!(ServiceName::parse("app1").is_ok());
        assert!(ServiceName::parse("my-api-2").is_ok());
    }

    #[test]
    fn test_service_name_rejects_invalid() {
        assert_eq!(ServiceName::parse(""), Err(InvalidServiceName::Empty));
        assert!(matches!(
            ServiceName::parse("App"),
            Err(InvalidServiceName::InvalidCharacters(_))
        ));
        assert!(matches!(
            ServiceName::parse("../etc"),
            Err(InvalidServiceName::InvalidCharacters(_))
        ));
        assert!(matches!(
            ServiceName::parse("a".repeat(MAX_SERVICE_NAME_LEN + 1)),
            Err(InvalidServiceName::TooLong(_))
        ));
    }

    #[test]
    fn test_service_name_deserialize_validates() {
        let ok: Result<ServiceName, _> = serde_json::from_str("\"web\"");
        assert!(ok.is_ok());
        let bad: Result<ServiceName, _> = serde_json::from_str("\"Web App\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_release_id_generation() {
        let id1 = ReleaseId::generate();
        let id2 = ReleaseId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_release_id_parses_display() {
        let id = ReleaseId::generate();
        let parsed: ReleaseId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<ReleaseId>().is_err());
    }

    #[test]
    fn test_bundle_ref_for_release() {
        let id = ReleaseId::generate();
        let bundle = BundleRef::for_release(&id);
        assert_eq!(bundle.as_str(), format!("{}.tgz", id));
        assert_eq!(bundle.release_id(), Some(id));
        assert!(bundle.is_plain_file_name());
    }

    #[test]
    fn test_bundle_ref_rejects_paths() {
        assert!(!BundleRef::new("../x.tgz").is_plain_file_name());
        assert!(!BundleRef::new("").is_plain_file_name());
        assert_eq!(BundleRef::new("notes.txt").release_id(), None);
    }
}
