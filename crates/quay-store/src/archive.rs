//! Synchronous helpers over gzip-compressed tar archives
//!
//! Callers run these inside `spawn_blocking`.

use crate::error::{Result, StoreError};
use flate2::read::GzDecoder;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

fn invalid(err: io::Error) -> StoreError {
    StoreError::InvalidBundle(err.to_string())
}

/// Strip `.` components so `./package.json` and `package.json` compare equal
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Walk every entry of the archive, returning the entry count
///
/// The full gzip stream is consumed so a truncated or corrupted upload is
/// rejected here rather than at extraction time.
pub fn validate(bytes: &[u8]) -> Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut count = 0;
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        entry.path().map_err(invalid)?;
        io::copy(&mut entry, &mut io::sink()).map_err(invalid)?;
        count += 1;
    }
    let mut decoder = archive.into_inner();
    io::copy(&mut decoder, &mut io::sink()).map_err(invalid)?;

    if count == 0 {
        return Err(StoreError::InvalidBundle("archive contains no entries".into()));
    }
    Ok(count)
}

/// Read a single entry without extracting the archive
pub fn read_entry<R: Read>(reader: R, entry_path: &str) -> Result<Option<Vec<u8>>> {
    let wanted = normalize(Path::new(entry_path));
    let mut archive = Archive::new(GzDecoder::new(reader));
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        let path = normalize(&entry.path().map_err(invalid)?);
        if path == wanted {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf).map_err(invalid)?;
            return Ok(Some(buf));
        }
    }
    Ok(None)
}

/// Extract the full archive into `target`, creating it if needed
///
/// Entries that would escape `target` are skipped by the unpacker.
pub fn unpack<R: Read>(reader: R, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target)?;
    let mut archive = Archive::new(GzDecoder::new(reader));
    archive.set_overwrite(true);
    archive.unpack(target)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    /// Build a `.tgz` from (path, contents) pairs
    pub(crate) fn pack(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, *contents).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_validate_counts_entries() {
        let bytes = pack(&[("package.json", b"{}"), ("index.js", b"console.log(1)")]);
        assert_eq!(validate(&bytes).unwrap(), 2);
    }

    #[test]
    fn test_validate_rejects_garbage() {
        assert!(matches!(
            validate(b"definitely not a tarball"),
            Err(StoreError::InvalidBundle(_))
        ));
    }

    #[test]
    fn test_validate_rejects_truncated_archive() {
        let bytes = pack(&[("index.js", &[b'x'; 4096])]);
        let truncated = &bytes[..bytes.len() / 2];
        assert!(matches!(validate(truncated), Err(StoreError::InvalidBundle(_))));
    }

    #[test]
    fn test_validate_rejects_empty_archive() {
        let bytes = pack(&[]);
        assert!(matches!(validate(&bytes), Err(StoreError::InvalidBundle(_))));
    }

    #[test]
    fn test_read_entry_matches_dot_prefix() {
        let bytes = pack(&[("package.json", br#"{"name":"web"}"#)]);
        let found = read_entry(&bytes[..], "./package.json").unwrap();
        assert_eq!(found.as_deref(), Some(&br#"{"name":"web"}"#[..]));
    }

    #[test]
    fn test_read_entry_missing() {
        let bytes = pack(&[("lib/package.json", b"{}")]);
        assert_eq!(read_entry(&bytes[..], "package.json").unwrap(), None);
    }

    #[test]
    fn test_unpack_full_tree() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = pack(&[("index.js", b"a"), ("lib/util.js", b"b")]);
        let target = dir.path().join("run");
        unpack(&bytes[..], &target).unwrap();

        assert_eq!(std::fs::read(target.join("index.js")).unwrap(), b"a");
        assert_eq!(std::fs::read(target.join("lib/util.js")).unwrap(), b"b");
    }
}
