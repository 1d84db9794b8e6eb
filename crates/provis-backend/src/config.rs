use crate::BackendError;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Installer settings kept with an installation (`.installation/installer.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<PathBuf>,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            repository: None,
            channel: None,
            backend: default_backend(),
            templates: None,
        }
    }
}

fn default_backend() -> String {
    "local".to_owned()
}

impl InstallerConfig {
    /// Load the config at `path`, or the defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, BackendError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load(path: &Path) -> Result<Self, BackendError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| BackendError::Config(format!("invalid installer config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), BackendError> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| BackendError::Io(e.error))?;
        Ok(())
    }

    /// Apply per-invocation overrides on top of the persisted settings.
    #[must_use]
    pub fn with_overrides(
        mut self,
        repository: Option<PathBuf>,
        channel: Option<PathBuf>,
        templates: Option<PathBuf>,
    ) -> Self {
        if repository.is_some() {
            self.repository = repository;
        }
        if channel.is_some() {
            self.channel = channel;
        }
        if templates.is_some() {
            self.templates = templates;
        }
        self
    }

    pub fn repository(&self) -> Result<&Path, BackendError> {
        self.repository
            .as_deref()
            .ok_or_else(|| BackendError::Config("no repository configured".to_owned()))
    }

    pub fn channel(&self) -> Result<&Path, BackendError> {
        self.channel
            .as_deref()
            .ok_or_else(|| BackendError::Config("no channel manifest configured".to_owned()))
    }
}
