//! Persistent installation state for provis.
//!
//! This crate owns everything provis writes to disk about an installation:
//! the `InstallLayout` path scheme, the checksummed provisioning record
//! (`MetadataStore`), the ordered accepted-license list (`LicenseStore`),
//! the marker that identifies a staged candidate (`CandidateMarker`), and the
//! `WriteAheadLog` that makes candidate promotion crash-safe.

pub mod candidate;
pub mod layout;
pub mod licenses;
pub mod metadata;
pub mod wal;

pub use candidate::CandidateMarker;
pub use layout::{InstallLayout, INSTALLATION_FORMAT_VERSION};
pub use licenses::LicenseStore;
pub use metadata::{MetadataStore, ProvisioningRecord};
pub use wal::{RollbackStep, WalEntry, WalOpKind, WriteAheadLog};

use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory to ensure that a preceding `rename()` is durable.
///
/// POSIX does not guarantee a rename survives a crash until the parent
/// directory itself has been synced.
pub fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Replace `dest` with `content` via a temp file in the same directory.
pub(crate) fn write_atomic(dest: &Path, content: &[u8]) -> Result<(), StoreError> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for '{}': expected {expected}, got {actual}", path.display())]
    IntegrityFailure {
        path: PathBuf,
        expected: String,
        actual: String,
    },
    #[error("'{}' is not a provisioned installation", .0.display())]
    NotProvisioned(PathBuf),
    #[error("no candidate marker in '{}'", .0.display())]
    CandidateMissing(PathBuf),
    #[error("installation format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("invalid installation path '{}'", .0.display())]
    InvalidPath(PathBuf),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display_not_provisioned() {
        let e = StoreError::NotProvisioned(PathBuf::from("/opt/server"));
        assert!(e.to_string().contains("/opt/server"));
    }

    #[test]
    fn store_error_display_version_mismatch() {
        let e = StoreError::VersionMismatch {
            expected: 2,
            found: 1,
        };
        let msg = e.to_string();
        assert!(msg.contains('2'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn store_error_display_integrity_failure() {
        let e = StoreError::IntegrityFailure {
            path: PathBuf::from("provisioning.json"),
            expected: "exp".to_owned(),
            actual: "act".to_owned(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exp"));
        assert!(msg.contains("act"));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "two");
    }
}
