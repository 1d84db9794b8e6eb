use crate::config::NamedConfig;
use crate::coordinate::FeaturePackCoordinate;
use crate::types::{ConfigName, LayerName, ModelName, PackageName};
use crate::SchemaError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

/// Descriptor shipped as `feature-pack.toml` at the root of every archive.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeaturePackSpec {
    pub feature_pack: FeaturePackSection,
    #[serde(default)]
    pub packages: Vec<PackageSpec>,
    #[serde(default)]
    pub layers: Vec<ConfigLayer>,
    #[serde(default)]
    pub configs: Vec<ConfigSpec>,
    #[serde(default)]
    pub licenses: Vec<LicenseSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeaturePackSection {
    pub location: FeaturePackCoordinate,
    #[serde(default)]
    pub dependencies: Vec<FeaturePackCoordinate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageSpec {
    pub name: PackageName,
}

/// A configuration layer of one model. `requires` and `optional` name other
/// layers of the same model, possibly defined by a dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub model: ModelName,
    pub name: LayerName,
    #[serde(default)]
    pub requires: BTreeSet<LayerName>,
    #[serde(default)]
    pub optional: BTreeSet<LayerName>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigSpec {
    pub model: ModelName,
    pub name: ConfigName,
    /// Provisioned unless the installation opts out of inherited configs.
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub layers: BTreeSet<LayerName>,
    #[serde(default)]
    pub excluded_layers: BTreeSet<LayerName>,
    #[serde(default)]
    pub packages: BTreeSet<PackageName>,
}

impl ConfigSpec {
    pub fn to_named_config(&self) -> NamedConfig {
        NamedConfig {
            model: self.model.clone(),
            name: self.name.clone(),
            included_layers: self.layers.clone(),
            excluded_layers: self.excluded_layers.clone(),
            package_deps: self.packages.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LicenseSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub text: String,
}

impl FeaturePackSpec {
    pub fn location(&self) -> &FeaturePackCoordinate {
        &self.feature_pack.location
    }

    /// Models this feature-pack contributes layers or configs to.
    pub fn models(&self) -> BTreeSet<ModelName> {
        self.layers
            .iter()
            .map(|l| l.model.clone())
            .chain(self.configs.iter().map(|c| c.model.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut layers = HashSet::new();
        for layer in &self.layers {
            if !layers.insert((layer.model.as_str(), layer.name.as_str())) {
                return Err(SchemaError::DuplicateLayer {
                    model: layer.model.to_string(),
                    name: layer.name.to_string(),
                });
            }
        }

        let mut configs = HashSet::new();
        for config in &self.configs {
            if !configs.insert((config.model.as_str(), config.name.as_str())) {
                return Err(SchemaError::DuplicateConfig {
                    model: config.model.to_string(),
                    name: config.name.to_string(),
                });
            }
        }

        let mut licenses = HashSet::new();
        for license in &self.licenses {
            if !licenses.insert(license.id.as_str()) {
                return Err(SchemaError::DuplicateLicense(license.id.clone()));
            }
        }
        Ok(())
    }
}

pub fn parse_feature_pack_str(input: &str) -> Result<FeaturePackSpec, SchemaError> {
    let spec: FeaturePackSpec = toml::from_str(input)?;
    spec.validate()?;
    Ok(spec)
}

pub fn parse_feature_pack_file(path: impl AsRef<Path>) -> Result<FeaturePackSpec, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_feature_pack_str(&content)
}
