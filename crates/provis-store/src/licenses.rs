use crate::layout::InstallLayout;
use crate::{write_atomic, StoreError};
use provis_schema::{merge_accepted, LicenseRecord};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Ordered record of the licenses accepted for an installation.
///
/// `accepted.json` keeps the records without their text; each text goes to
/// its own file next to it.
pub struct LicenseStore {
    layout: InstallLayout,
}

impl LicenseStore {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    pub fn accepted(&self) -> Result<Vec<LicenseRecord>, StoreError> {
        let path = self.layout.accepted_licenses_file();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Append `added` after the licenses already accepted, skipping ids that
    /// are already present. Returns the merged list as written.
    pub fn record_agreements(
        &self,
        added: &[LicenseRecord],
    ) -> Result<Vec<LicenseRecord>, StoreError> {
        let prior = self.accepted()?;
        let merged = merge_accepted(&prior, added);

        // Texts of already accepted ids stay as the user saw them.
        let mut known: HashSet<&str> = prior.iter().map(|l| l.id.as_str()).collect();
        for license in added.iter().filter(|l| known.insert(l.id.as_str())) {
            if !license.text.is_empty() {
                write_atomic(&self.text_file(&license.id), license.text.as_bytes())?;
            }
        }

        let stored: Vec<LicenseRecord> = merged
            .iter()
            .cloned()
            .map(|mut l| {
                l.text.clear();
                l
            })
            .collect();
        let content = serde_json::to_string_pretty(&stored)?;
        write_atomic(&self.layout.accepted_licenses_file(), content.as_bytes())?;
        debug!(
            "recorded {} accepted licenses ({} prior)",
            stored.len(),
            prior.len()
        );
        Ok(stored)
    }

    pub fn text_file(&self, id: &str) -> PathBuf {
        self.layout
            .licenses_dir()
            .join(format!("{}.txt", file_stem(id)))
    }
}

/// License ids are free text; anything outside `[A-Za-z0-9._-]` is hashed.
fn file_stem(id: &str) -> String {
    let safe = !id.is_empty()
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.'));
    if safe {
        id.to_owned()
    } else {
        blake3::hash(id.as_bytes()).to_hex()[..16].to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provis_schema::FeaturePackCoordinate;

    fn license(id: &str, text: &str) -> LicenseRecord {
        LicenseRecord {
            id: id.to_owned(),
            owning_feature_pack: FeaturePackCoordinate::parse("org.test:pack:1.0").unwrap(),
            title: id.to_uppercase(),
            text: text.to_owned(),
        }
    }

    fn test_store() -> (tempfile::TempDir, LicenseStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = InstallLayout::new(dir.path().join("server"));
        layout.initialize().unwrap();
        (dir, LicenseStore::new(layout))
    }

    #[test]
    fn empty_when_nothing_recorded() {
        let (_dir, store) = test_store();
        assert!(store.accepted().unwrap().is_empty());
    }

    #[test]
    fn prior_acceptances_precede_new_ones() {
        let (_dir, store) = test_store();
        store
            .record_agreements(&[license("base-license", "")])
            .unwrap();
        store
            .record_agreements(&[license("added-license", ""), license("base-license", "")])
            .unwrap();

        let ids: Vec<String> = store.accepted().unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(ids, ["base-license", "added-license"]);
    }

    #[test]
    fn accepted_text_is_not_replaced() {
        let (_dir, store) = test_store();
        store
            .record_agreements(&[license("base-license", "Base license text")])
            .unwrap();

        let mut reshipped = license("base-license", "different text");
        reshipped.owning_feature_pack = FeaturePackCoordinate::parse("org.test:added-pack:2.0").unwrap();
        store
            .record_agreements(&[license("added-license", "added terms"), reshipped])
            .unwrap();

        assert_eq!(
            fs::read_to_string(store.text_file("base-license")).unwrap(),
            "Base license text"
        );
        assert_eq!(
            fs::read_to_string(store.text_file("added-license")).unwrap(),
            "added terms"
        );
        let accepted = store.accepted().unwrap();
        assert_eq!(accepted[0].owning_feature_pack.to_string(), "org.test:pack:1.0");
    }

    #[test]
    fn texts_are_written_separately() {
        let (_dir, store) = test_store();
        store
            .record_agreements(&[license("added-license", "the terms")])
            .unwrap();
        let accepted = store.accepted().unwrap();
        assert!(accepted[0].text.is_empty());
        assert_eq!(
            fs::read_to_string(store.text_file("added-license")).unwrap(),
            "the terms"
        );
    }

    #[test]
    fn unsafe_ids_are_hashed() {
        assert_eq!(file_stem("apache-2.0"), "apache-2.0");
        let stem = file_stem("../../etc/passwd");
        assert_eq!(stem.len(), 16);
        assert!(!stem.contains('/'));
    }
}
