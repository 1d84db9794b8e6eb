use crate::local::LocalRepository;
use crate::BackendError;
use provis_schema::FeaturePackCoordinate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One artifact version offered by a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stream {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl Stream {
    pub fn matches(&self, location: &FeaturePackCoordinate) -> bool {
        self.group == location.group_id() && self.artifact == location.artifact_id()
    }

    pub fn coordinate(&self) -> FeaturePackCoordinate {
        FeaturePackCoordinate::new(
            self.group.clone(),
            self.artifact.clone(),
            Some(self.version.clone()),
        )
    }
}

/// Maps coordinates to the versions the configured channels offer.
pub trait ChannelResolver: Send + Sync {
    /// Streams listed for the producer of `location`. Empty when the
    /// feature-pack is not listed by any channel.
    fn resolve_manifest(&self, location: &FeaturePackCoordinate)
        -> Result<Vec<Stream>, BackendError>;

    /// Fetch the archive of a versioned feature-pack.
    fn fetch_artifact(&self, location: &FeaturePackCoordinate) -> Result<PathBuf, BackendError>;
}

/// `channel.toml`: a flat list of `[[streams]]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelManifest {
    #[serde(default)]
    pub streams: Vec<Stream>,
}

impl ChannelManifest {
    pub fn parse(input: &str) -> Result<Self, BackendError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

/// A channel manifest on disk backed by a [`LocalRepository`].
pub struct LocalChannel {
    manifest: ChannelManifest,
    repository: LocalRepository,
}

impl LocalChannel {
    pub fn new(manifest: ChannelManifest, repository: LocalRepository) -> Self {
        Self {
            manifest,
            repository,
        }
    }

    pub fn load(path: &Path, repository: LocalRepository) -> Result<Self, BackendError> {
        Ok(Self::new(ChannelManifest::load(path)?, repository))
    }
}

impl ChannelResolver for LocalChannel {
    fn resolve_manifest(
        &self,
        location: &FeaturePackCoordinate,
    ) -> Result<Vec<Stream>, BackendError> {
        let streams: Vec<Stream> = self
            .manifest
            .streams
            .iter()
            .filter(|s| s.matches(location))
            .cloned()
            .collect();
        debug!("{} streams listed for {}", streams.len(), location.producer());
        Ok(streams)
    }

    fn fetch_artifact(&self, location: &FeaturePackCoordinate) -> Result<PathBuf, BackendError> {
        let path = self.repository.artifact_path(location)?;
        if !path.is_file() {
            return Err(BackendError::Fetch {
                coordinate: location.to_string(),
                reason: format!("{} does not exist", path.display()),
            });
        }
        Ok(path)
    }
}
