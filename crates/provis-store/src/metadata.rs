use crate::layout::{InstallLayout, INSTALLATION_FORMAT_VERSION};
use crate::{write_atomic, StoreError};
use provis_schema::ProvisioningConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::debug;

/// The persisted provisioning config of an installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisioningRecord {
    pub format_version: u32,
    pub config: ProvisioningConfig,
    pub updated_at: String,
    /// blake3 checksum over the record with this field unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ProvisioningRecord {
    pub fn new(config: ProvisioningConfig) -> Self {
        Self {
            format_version: INSTALLATION_FORMAT_VERSION,
            config,
            updated_at: chrono::Utc::now().to_rfc3339(),
            checksum: None,
        }
    }

    /// Identity of this record's content: the stored checksum, or a fresh
    /// hash for hand-edited records that carry none.
    pub fn fingerprint(&self) -> Result<String, StoreError> {
        match &self.checksum {
            Some(checksum) => Ok(checksum.clone()),
            None => self.compute_checksum(),
        }
    }

    fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

pub struct MetadataStore {
    layout: InstallLayout,
}

impl MetadataStore {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Persist `config`, returning the record as written (checksum included).
    pub fn save(&self, config: &ProvisioningConfig) -> Result<ProvisioningRecord, StoreError> {
        let mut record = ProvisioningRecord::new(config.clone());
        record.checksum = Some(record.compute_checksum()?);
        let content = serde_json::to_string_pretty(&record)?;
        write_atomic(&self.layout.provisioning_file(), content.as_bytes())?;
        debug!(
            "saved provisioning record to {}",
            self.layout.provisioning_file().display()
        );
        Ok(record)
    }

    pub fn load(&self) -> Result<ProvisioningRecord, StoreError> {
        let path = self.layout.provisioning_file();
        if !path.exists() {
            return Err(StoreError::NotProvisioned(self.layout.root().to_path_buf()));
        }
        let content = fs::read_to_string(&path)?;
        let record: ProvisioningRecord = serde_json::from_str(&content)?;

        if record.format_version != INSTALLATION_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: INSTALLATION_FORMAT_VERSION,
                found: record.format_version,
            });
        }

        // Hand-edited records carry no checksum and are accepted as-is.
        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                return Err(StoreError::IntegrityFailure {
                    path,
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        Ok(record)
    }

    pub fn load_config(&self) -> Result<ProvisioningConfig, StoreError> {
        Ok(self.load()?.config)
    }
}
