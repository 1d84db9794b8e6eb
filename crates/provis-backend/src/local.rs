use crate::archive::{read_descriptor, unpack_content};
use crate::backend::{LicenseSource, ProvisioningBackend};
use crate::BackendError;
use provis_schema::{FeaturePackCoordinate, FeaturePackSpec, LicenseRecord, ProvisioningConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A directory of feature-pack archives laid out as
/// `<group with '.' as '/'>/<artifact>/<version>/<artifact>-<version>.tar`.
#[derive(Debug, Clone)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, location: &FeaturePackCoordinate) -> Result<PathBuf, BackendError> {
        let version = location
            .version()
            .ok_or_else(|| BackendError::Unversioned(location.to_string()))?;
        let mut path = self.root.clone();
        path.extend(location.group_id().split('.'));
        Ok(path
            .join(location.artifact_id())
            .join(version)
            .join(format!("{}-{version}.tar", location.artifact_id())))
    }

    /// Store an archive under its coordinate.
    pub fn deploy(
        &self,
        location: &FeaturePackCoordinate,
        archive: &[u8],
    ) -> Result<PathBuf, BackendError> {
        let path = self.artifact_path(location)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, archive)?;
        debug!("deployed {location} to {}", path.display());
        Ok(path)
    }

    fn existing_archive(&self, location: &FeaturePackCoordinate) -> Result<PathBuf, BackendError> {
        let path = self.artifact_path(location)?;
        if !path.is_file() {
            return Err(BackendError::Fetch {
                coordinate: location.to_string(),
                reason: format!("{} does not exist", path.display()),
            });
        }
        Ok(path)
    }
}

impl ProvisioningBackend for LocalRepository {
    fn name(&self) -> &'static str {
        "local"
    }

    fn read_feature_pack(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<FeaturePackSpec, BackendError> {
        let spec = read_descriptor(&self.existing_archive(location)?)?;
        if !spec.location().same_producer(location) {
            return Err(BackendError::Fetch {
                coordinate: location.to_string(),
                reason: format!("archive describes {}", spec.location()),
            });
        }
        Ok(spec)
    }

    /// Unpacks the `content/` tree of every direct and transitive feature-pack,
    /// dependencies of a feature-pack first so it can override their files.
    fn materialize(&self, config: &ProvisioningConfig, target: &Path) -> Result<(), BackendError> {
        let deps: Vec<_> = config.all_deps().collect();
        for dep in deps.iter().rev() {
            let written = unpack_content(&self.existing_archive(&dep.location)?, target)?;
            debug!("unpacked {written} files from {}", dep.location);
        }
        info!(
            "materialized {} feature-packs into {}",
            deps.len(),
            target.display()
        );
        Ok(())
    }
}

impl LicenseSource for LocalRepository {
    fn get_licenses(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<Vec<LicenseRecord>, BackendError> {
        Ok(LicenseRecord::from_spec(&self.read_feature_pack(location)?))
    }
}
