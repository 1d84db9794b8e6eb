use crate::coordinate::FeaturePackCoordinate;
use crate::feature_pack::FeaturePackSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub id: String,
    pub owning_feature_pack: FeaturePackCoordinate,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl LicenseRecord {
    /// License records declared by a feature-pack descriptor, in declaration order.
    pub fn from_spec(spec: &FeaturePackSpec) -> Vec<Self> {
        spec.licenses
            .iter()
            .map(|l| Self {
                id: l.id.clone(),
                owning_feature_pack: spec.location().clone(),
                title: l.title.clone(),
                text: l.text.clone(),
            })
            .collect()
    }
}

/// Merge `added` after `prior`, keeping the first occurrence of every id.
pub fn merge_accepted(prior: &[LicenseRecord], added: &[LicenseRecord]) -> Vec<LicenseRecord> {
    let mut seen = HashSet::new();
    prior
        .iter()
        .chain(added)
        .filter(|l| seen.insert(l.id.as_str()))
        .cloned()
        .collect()
}
