use crate::StoreError;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Current on-disk format of `.installation/`. Incremented on incompatible changes.
pub const INSTALLATION_FORMAT_VERSION: u32 = 1;

const METADATA_DIR: &str = ".installation";

/// Path scheme of one installation.
///
/// Everything inside [`root`](Self::root) is swapped as a whole when a
/// candidate is promoted. State that must survive the swap (writer lock, WAL)
/// lives in the sibling control directory `.<name>.provis`.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    #[inline]
    pub fn provisioning_file(&self) -> PathBuf {
        self.metadata_dir().join("provisioning.json")
    }

    #[inline]
    pub fn installer_config_file(&self) -> PathBuf {
        self.metadata_dir().join("installer.json")
    }

    #[inline]
    pub fn licenses_dir(&self) -> PathBuf {
        self.metadata_dir().join("licenses")
    }

    #[inline]
    pub fn accepted_licenses_file(&self) -> PathBuf {
        self.licenses_dir().join("accepted.json")
    }

    /// Only present inside a staged candidate.
    #[inline]
    pub fn candidate_marker_file(&self) -> PathBuf {
        self.metadata_dir().join("candidate.json")
    }

    pub fn control_dir(&self) -> Result<PathBuf, StoreError> {
        self.sibling(".provis")
    }

    pub fn lock_file(&self) -> Result<PathBuf, StoreError> {
        Ok(self.control_dir()?.join("lock"))
    }

    pub fn wal_dir(&self) -> Result<PathBuf, StoreError> {
        Ok(self.control_dir()?.join("wal"))
    }

    /// Where the live tree is parked while a candidate takes its place.
    pub fn backup_dir(&self, op_id: &str) -> Result<PathBuf, StoreError> {
        self.sibling(&format!(".backup-{op_id}"))
    }

    /// Where a candidate waits next to the live tree before the final rename.
    pub fn promotion_dir(&self, op_id: &str) -> Result<PathBuf, StoreError> {
        self.sibling(&format!(".candidate-{op_id}"))
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioning_file().is_file()
    }

    /// Create the metadata directories of a fresh tree.
    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.metadata_dir())?;
        fs::create_dir_all(self.licenses_dir())?;
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> Result<PathBuf, StoreError> {
        let name = self
            .root
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(self.root.clone()))?;
        let mut sibling = OsString::from(".");
        sibling.push(name);
        sibling.push(suffix);
        Ok(match self.root.parent() {
            Some(parent) => parent.join(sibling),
            None => PathBuf::from(sibling),
        })
    }
}
