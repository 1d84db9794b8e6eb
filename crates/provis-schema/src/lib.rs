//! Value types for provis.
//!
//! This crate defines the data the installer reasons about: feature-pack
//! coordinates, the provisioning configuration of an installation
//! (`ProvisioningConfig`), feature-pack descriptors (`feature-pack.toml`),
//! templates that steer where a new feature-pack is placed, and license
//! records. Nothing here performs I/O beyond parsing descriptor files.

pub mod config;
pub mod coordinate;
pub mod feature_pack;
pub mod license;
pub mod template;
pub mod types;

pub use config::{ConfigId, Directness, FeaturePackDep, NamedConfig, ProvisioningConfig};
pub use coordinate::{CoordinateError, FeaturePackCoordinate};
pub use feature_pack::{
    parse_feature_pack_file, parse_feature_pack_str, ConfigLayer, ConfigSpec, FeaturePackSection,
    FeaturePackSpec, LicenseSpec, PackageSpec,
};
pub use license::{merge_accepted, LicenseRecord};
pub use template::{
    parse_templates_file, parse_templates_str, FeaturePackTemplate, TemplatePlacement, TemplateSet,
};
pub use types::{ConfigName, LayerName, ModelName, PackageName};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read descriptor: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse descriptor: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error(transparent)]
    Coordinate(#[from] CoordinateError),
    #[error("invalid config id '{0}', expected [<model>/]<name>")]
    InvalidConfigId(String),
    #[error("template for '{feature_pack}' declares both replaces and transitive_dependency_of")]
    ConflictingPlacement { feature_pack: String },
    #[error("more than one template for '{0}'")]
    DuplicateTemplate(String),
    #[error("feature-pack '{0}' appears more than once")]
    DuplicateFeaturePack(String),
    #[error("config '{model}/{name}' is defined more than once")]
    DuplicateConfig { model: String, name: String },
    #[error("layer '{name}' of model '{model}' is defined more than once")]
    DuplicateLayer { model: String, name: String },
    #[error("license '{0}' is declared more than once")]
    DuplicateLicense(String),
    #[error("{directness} dependency '{location}' is listed in the wrong section")]
    MisplacedDependency {
        location: String,
        directness: String,
    },
}
