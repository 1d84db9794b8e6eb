use crate::coordinate::FeaturePackCoordinate;
use crate::types::{ConfigName, LayerName, ModelName, PackageName};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// Selector of a named configuration. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfigId {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ConfigName>,
}

impl ConfigId {
    pub fn new(model: impl Into<ModelName>, name: impl Into<ConfigName>) -> Self {
        Self {
            model: Some(model.into()),
            name: Some(name.into()),
        }
    }

    pub fn model_only(model: impl Into<ModelName>) -> Self {
        Self {
            model: Some(model.into()),
            name: None,
        }
    }

    pub fn name_only(name: impl Into<ConfigName>) -> Self {
        Self {
            model: None,
            name: Some(name.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.name.is_none()
    }
}

impl fmt::Display for ConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let model = self.model.as_deref().unwrap_or("");
        let name = self.name.as_deref().unwrap_or("");
        write!(f, "{model}/{name}")
    }
}

/// Accepts `model/name`, `model/`, `/name` and a bare `name`.
impl FromStr for ConfigId {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (model, name) = match s.split_once('/') {
            Some((m, n)) => (m.trim(), n.trim()),
            None => ("", s),
        };
        if name.contains('/') {
            return Err(SchemaError::InvalidConfigId(s.to_owned()));
        }
        let id = Self {
            model: (!model.is_empty()).then(|| ModelName::from(model)),
            name: (!name.is_empty()).then(|| ConfigName::from(name)),
        };
        if id.is_empty() {
            return Err(SchemaError::InvalidConfigId(s.to_owned()));
        }
        Ok(id)
    }
}

/// A concrete configuration within a model, composed of layers and packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedConfig {
    pub model: ModelName,
    pub name: ConfigName,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub included_layers: BTreeSet<LayerName>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_layers: BTreeSet<LayerName>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub package_deps: BTreeSet<PackageName>,
}

impl NamedConfig {
    pub fn new(model: impl Into<ModelName>, name: impl Into<ConfigName>) -> Self {
        Self {
            model: model.into(),
            name: name.into(),
            included_layers: BTreeSet::new(),
            excluded_layers: BTreeSet::new(),
            package_deps: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ConfigId {
        ConfigId::new(self.model.clone(), self.name.clone())
    }

    pub fn matches(&self, model: &str, name: &str) -> bool {
        self.model == model && self.name == name
    }

    /// Include a layer. An inclusion always cancels an earlier exclusion of
    /// the same layer and never adds a new exclusion.
    pub fn include_layer(&mut self, layer: LayerName) {
        self.excluded_layers.remove(&layer);
        self.included_layers.insert(layer);
    }

    #[must_use]
    pub fn with_layer(mut self, layer: impl Into<LayerName>) -> Self {
        self.include_layer(layer.into());
        self
    }

    #[must_use]
    pub fn without_layer(mut self, layer: impl Into<LayerName>) -> Self {
        let layer = layer.into();
        self.included_layers.remove(&layer);
        self.excluded_layers.insert(layer);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directness {
    Direct,
    Transitive,
}

impl fmt::Display for Directness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Directness::Direct => write!(f, "direct"),
            Directness::Transitive => write!(f, "transitive"),
        }
    }
}

/// How one feature-pack takes part in an installation.
///
/// `inherit_configs` / `inherit_packages` are tri-state: `None` applies the
/// feature-pack's own defaults, `Some(false)` provisions only what is listed
/// explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePackDep {
    pub location: FeaturePackCoordinate,
    pub directness: Directness,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit_configs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherit_packages: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub included_configs: BTreeSet<ConfigId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub included_packages: BTreeSet<PackageName>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub excluded_packages: BTreeSet<PackageName>,
    /// Producer of the direct dependency a transitive entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency_of: Option<String>,
}

impl FeaturePackDep {
    pub fn direct(location: FeaturePackCoordinate) -> Self {
        Self {
            location,
            directness: Directness::Direct,
            inherit_configs: None,
            inherit_packages: None,
            included_configs: BTreeSet::new(),
            included_packages: BTreeSet::new(),
            excluded_packages: BTreeSet::new(),
            dependency_of: None,
        }
    }

    pub fn transitive(location: FeaturePackCoordinate, parent: Option<String>) -> Self {
        Self {
            directness: Directness::Transitive,
            dependency_of: parent,
            ..Self::direct(location)
        }
    }

    pub fn producer(&self) -> String {
        self.location.producer()
    }
}

/// Full installed or desired state of an installation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    #[serde(default)]
    pub feature_pack_deps: Vec<FeaturePackDep>,
    #[serde(default)]
    pub transitive_deps: Vec<FeaturePackDep>,
    #[serde(default)]
    pub defined_configs: Vec<NamedConfig>,
}

impl ProvisioningConfig {
    pub fn direct_dep(&self, location: &FeaturePackCoordinate) -> Option<&FeaturePackDep> {
        self.feature_pack_deps
            .iter()
            .find(|d| d.location.same_producer(location))
    }

    pub fn has_direct_dep(&self, location: &FeaturePackCoordinate) -> bool {
        self.direct_dep(location).is_some()
    }

    pub fn transitive_dep(&self, location: &FeaturePackCoordinate) -> Option<&FeaturePackDep> {
        self.transitive_deps
            .iter()
            .find(|d| d.location.same_producer(location))
    }

    pub fn defined_config(&self, model: &str, name: &str) -> Option<&NamedConfig> {
        self.defined_configs.iter().find(|c| c.matches(model, name))
    }

    /// Iterate direct entries followed by transitive ones.
    pub fn all_deps(&self) -> impl Iterator<Item = &FeaturePackDep> {
        self.feature_pack_deps
            .iter()
            .chain(self.transitive_deps.iter())
    }

    /// Check the structural invariants: unique producers across all entries,
    /// entries placed in the list matching their directness, and unique
    /// `(model, name)` configs.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut producers = HashSet::new();
        for (list, expected) in [
            (&self.feature_pack_deps, Directness::Direct),
            (&self.transitive_deps, Directness::Transitive),
        ] {
            for dep in list {
                if dep.directness != expected {
                    return Err(SchemaError::MisplacedDependency {
                        location: dep.location.to_string(),
                        directness: dep.directness.to_string(),
                    });
                }
                if !producers.insert(dep.producer()) {
                    return Err(SchemaError::DuplicateFeaturePack(dep.producer()));
                }
            }
        }

        let mut configs = HashSet::new();
        for config in &self.defined_configs {
            if !configs.insert((config.model.as_str(), config.name.as_str())) {
                return Err(SchemaError::DuplicateConfig {
                    model: config.model.to_string(),
                    name: config.name.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(s: &str) -> FeaturePackCoordinate {
        FeaturePackCoordinate::parse(s).unwrap()
    }

    #[test]
    fn config_id_parsing() {
        assert_eq!(
            "standalone/standalone.xml".parse::<ConfigId>().unwrap(),
            ConfigId::new("standalone", "standalone.xml")
        );
        assert_eq!(
            "standalone/".parse::<ConfigId>().unwrap(),
            ConfigId::model_only("standalone")
        );
        assert_eq!(
            "test.xml".parse::<ConfigId>().unwrap(),
            ConfigId::name_only("test.xml")
        );
        assert_eq!(
            "/test.xml".parse::<ConfigId>().unwrap(),
            ConfigId::name_only("test.xml")
        );
        assert!("/".parse::<ConfigId>().is_err());
        assert!("a/b/c".parse::<ConfigId>().is_err());
    }

    #[test]
    fn config_id_display() {
        assert_eq!(ConfigId::new("m", "n").to_string(), "m/n");
        assert_eq!(ConfigId::model_only("m").to_string(), "m/");
    }

    #[test]
    fn include_layer_cancels_exclusion() {
        let mut config = NamedConfig::new("model", "test.xml")
            .with_layer("layer1")
            .without_layer("layer2")
            .without_layer("layer3");
        config.include_layer(LayerName::from("layer2"));

        assert!(config.included_layers.contains("layer1"));
        assert!(config.included_layers.contains("layer2"));
        assert!(!config.excluded_layers.contains("layer2"));
        assert!(config.excluded_layers.contains("layer3"));
    }

    #[test]
    fn include_layer_is_idempotent() {
        let mut config = NamedConfig::new("model", "test.xml").with_layer("layer1");
        config.include_layer(LayerName::from("layer1"));
        assert_eq!(config.included_layers.len(), 1);
    }

    #[test]
    fn direct_lookup_ignores_version() {
        let config = ProvisioningConfig {
            feature_pack_deps: vec![FeaturePackDep::direct(coord("org.test:base-pack:1.0.0"))],
            ..Default::default()
        };
        assert!(config.has_direct_dep(&coord("org.test:base-pack")));
        assert!(!config.has_direct_dep(&coord("org.test:other")));
    }

    #[test]
    fn validate_rejects_duplicate_producers() {
        let config = ProvisioningConfig {
            feature_pack_deps: vec![FeaturePackDep::direct(coord("org.test:a:1"))],
            transitive_deps: vec![FeaturePackDep::transitive(coord("org.test:a:2"), None)],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchemaError::DuplicateFeaturePack(p)) if p == "org.test:a"
        ));
    }

    #[test]
    fn validate_rejects_duplicate_configs() {
        let config = ProvisioningConfig {
            defined_configs: vec![
                NamedConfig::new("m", "n"),
                NamedConfig::new("m", "n").with_layer("l"),
            ],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchemaError::DuplicateConfig { .. })
        ));
    }

    #[test]
    fn validate_rejects_misplaced_entries() {
        let config = ProvisioningConfig {
            feature_pack_deps: vec![FeaturePackDep::transitive(coord("org.test:a"), None)],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SchemaError::MisplacedDependency { .. })
        ));
    }

    #[test]
    fn unset_inheritance_is_not_serialized() {
        let dep = FeaturePackDep::direct(coord("org.test:a"));
        let json = serde_json::to_string(&dep).unwrap();
        assert!(!json.contains("inherit_configs"));

        let mut dep = dep;
        dep.inherit_configs = Some(false);
        let json = serde_json::to_string(&dep).unwrap();
        assert!(json.contains("\"inherit_configs\":false"));
        let back: FeaturePackDep = serde_json::from_str(&json).unwrap();
        assert_eq!(back.inherit_configs, Some(false));
        assert_eq!(back.inherit_packages, None);
    }
}
