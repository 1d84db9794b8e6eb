use crate::layout::InstallLayout;
use crate::{write_atomic, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Identifies a staging directory as a candidate for one installation.
///
/// `base_checksum` is the fingerprint of the live provisioning record the
/// candidate was computed from. Promotion refuses a candidate whose base no
/// longer matches the live installation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateMarker {
    pub target: PathBuf,
    pub feature_pack: String,
    #[serde(default)]
    pub base_checksum: Option<String>,
    pub created_at: String,
}

impl CandidateMarker {
    pub fn new(target: PathBuf, feature_pack: String, base_checksum: Option<String>) -> Self {
        Self {
            target,
            feature_pack,
            base_checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn save(&self, staging: &InstallLayout) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(&staging.candidate_marker_file(), content.as_bytes())
    }

    pub fn load(staging: &InstallLayout) -> Result<Self, StoreError> {
        let path = staging.candidate_marker_file();
        if !path.exists() {
            return Err(StoreError::CandidateMissing(staging.root().to_path_buf()));
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Drop the marker so the promoted tree reads as a plain installation.
    pub fn remove(staging: &InstallLayout) -> Result<(), StoreError> {
        let path = staging.candidate_marker_file();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_roundtrip_and_removal() {
        let dir = tempfile::tempdir().unwrap();
        let staging = InstallLayout::new(dir.path().join("staging"));
        staging.initialize().unwrap();

        let marker = CandidateMarker::new(
            dir.path().join("server"),
            "org.test:added-pack:1.0.0".to_owned(),
            Some("abc".to_owned()),
        );
        marker.save(&staging).unwrap();
        assert_eq!(CandidateMarker::load(&staging).unwrap(), marker);

        CandidateMarker::remove(&staging).unwrap();
        assert!(matches!(
            CandidateMarker::load(&staging),
            Err(StoreError::CandidateMissing(_))
        ));
        CandidateMarker::remove(&staging).unwrap();
    }
}
