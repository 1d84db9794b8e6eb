use crate::channel::{ChannelResolver, LocalChannel};
use crate::config::InstallerConfig;
use crate::local::LocalRepository;
use crate::mock::MockBackend;
use crate::BackendError;
use provis_schema::{FeaturePackCoordinate, FeaturePackSpec, LicenseRecord, ProvisioningConfig};
use std::path::Path;
use std::sync::Arc;

/// The engine that turns a provisioning config into files on disk.
pub trait ProvisioningBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Read the descriptor (layers, configs, dependencies) of a versioned
    /// feature-pack.
    fn read_feature_pack(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<FeaturePackSpec, BackendError>;

    /// Build the content of an installation provisioned with `config` into
    /// `target`. `target` exists and is empty apart from installer metadata.
    fn materialize(&self, config: &ProvisioningConfig, target: &Path) -> Result<(), BackendError>;
}

pub trait LicenseSource: Send + Sync {
    /// Licenses a versioned feature-pack requires, in declaration order.
    fn get_licenses(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<Vec<LicenseRecord>, BackendError>;
}

/// The collaborators one installer instance works with.
#[derive(Clone)]
pub struct Backends {
    pub provisioning: Arc<dyn ProvisioningBackend>,
    pub channel: Arc<dyn ChannelResolver>,
    pub licenses: Arc<dyn LicenseSource>,
}

impl Backends {
    pub fn from_mock(mock: Arc<MockBackend>) -> Self {
        Self {
            provisioning: mock.clone(),
            channel: mock.clone(),
            licenses: mock,
        }
    }

    pub fn from_config(config: &InstallerConfig) -> Result<Self, BackendError> {
        if config.backend == "mock" {
            return Ok(Self::from_mock(Arc::new(MockBackend::new())));
        }
        let repository = Arc::new(LocalRepository::new(config.repository()?));
        let channel = Arc::new(LocalChannel::load(config.channel()?, (*repository).clone())?);
        Ok(Self {
            provisioning: select_backend(&config.backend, &repository)?,
            channel,
            licenses: repository,
        })
    }
}

pub fn select_backend(
    name: &str,
    repository: &Arc<LocalRepository>,
) -> Result<Arc<dyn ProvisioningBackend>, BackendError> {
    match name {
        "local" => Ok(repository.clone()),
        "mock" => Ok(Arc::new(MockBackend::new())),
        other => Err(BackendError::BackendUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_backends() {
        let repo = Arc::new(LocalRepository::new("/tmp/provis-test-repo"));
        assert_eq!(select_backend("local", &repo).unwrap().name(), "local");
        assert_eq!(select_backend("mock", &repo).unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_backend_fails() {
        let repo = Arc::new(LocalRepository::new("/tmp/provis-test-repo"));
        assert!(matches!(
            select_backend("nonexistent", &repo),
            Err(BackendError::BackendUnavailable(_))
        ));
    }

    #[test]
    fn mock_config_needs_no_repository() {
        let config = InstallerConfig {
            backend: "mock".to_owned(),
            ..InstallerConfig::default()
        };
        let backends = Backends::from_config(&config).unwrap();
        assert_eq!(backends.provisioning.name(), "mock");
    }

    #[test]
    fn local_config_requires_repository() {
        let config = InstallerConfig::default();
        assert!(matches!(
            Backends::from_config(&config),
            Err(BackendError::Config(_))
        ));
    }
}
