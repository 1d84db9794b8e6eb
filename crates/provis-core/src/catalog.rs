//! Layer and config catalog of a feature-pack and its dependency closure.

use crate::CoreError;
use provis_backend::{Backends, BackendError, ChannelResolver};
use provis_schema::{
    ConfigName, FeaturePackCoordinate, FeaturePackSpec, LayerName, ModelName, NamedConfig,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::{debug, info};

/// Dependency edges of one layer. Edges are informational: they never widen
/// what gets included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerNode {
    pub requires: BTreeSet<LayerName>,
    pub optional: BTreeSet<LayerName>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub config: NamedConfig,
    pub default: bool,
    pub owner: FeaturePackCoordinate,
}

/// Aggregated, read-only view over a set of feature-pack descriptors.
///
/// Layers and configs are keyed by `(model, name)` values. When several
/// feature-packs define the same config the one closest to the root wins;
/// layer definitions with the same key merge their edges.
#[derive(Debug, Clone)]
pub struct Catalog {
    root: FeaturePackCoordinate,
    feature_packs: Vec<FeaturePackCoordinate>,
    layers: BTreeMap<(ModelName, LayerName), LayerNode>,
    configs: BTreeMap<(ModelName, ConfigName), CatalogConfig>,
}

impl Catalog {
    /// Build a catalog from descriptors ordered root first.
    pub fn from_specs(root: FeaturePackCoordinate, specs: &[FeaturePackSpec]) -> Self {
        let mut layers: BTreeMap<(ModelName, LayerName), LayerNode> = BTreeMap::new();
        let mut configs = BTreeMap::new();

        for spec in specs {
            for layer in &spec.layers {
                let node = layers
                    .entry((layer.model.clone(), layer.name.clone()))
                    .or_default();
                node.requires.extend(layer.requires.iter().cloned());
                node.optional.extend(layer.optional.iter().cloned());
            }
            for config in &spec.configs {
                configs
                    .entry((config.model.clone(), config.name.clone()))
                    .or_insert_with(|| CatalogConfig {
                        config: config.to_named_config(),
                        default: config.default,
                        owner: spec.location().clone(),
                    });
            }
        }

        Self {
            root,
            feature_packs: specs.iter().map(|s| s.location().clone()).collect(),
            layers,
            configs,
        }
    }

    pub fn root(&self) -> &FeaturePackCoordinate {
        &self.root
    }

    pub fn feature_packs(&self) -> &[FeaturePackCoordinate] {
        &self.feature_packs
    }

    /// Models that have at least one layer or config.
    pub fn models(&self) -> BTreeSet<ModelName> {
        self.layers
            .keys()
            .map(|(m, _)| m.clone())
            .chain(self.configs.keys().map(|(m, _)| m.clone()))
            .collect()
    }

    pub fn has_model(&self, model: &str) -> bool {
        self.layers.keys().any(|(m, _)| m == model) || self.configs.keys().any(|(m, _)| m == model)
    }

    pub fn layer(&self, model: &str, name: &str) -> Option<&LayerNode> {
        self.layers
            .get(&(ModelName::from(model), LayerName::from(name)))
    }

    pub fn layers_of(&self, model: &str) -> BTreeSet<LayerName> {
        self.layers
            .keys()
            .filter(|(m, _)| m == model)
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Every layer name across every model.
    pub fn all_layer_names(&self) -> BTreeSet<LayerName> {
        self.layers.keys().map(|(_, l)| l.clone()).collect()
    }

    /// Models defining at least one of `layers`.
    pub fn models_defining(&self, layers: &BTreeSet<LayerName>) -> BTreeSet<ModelName> {
        self.layers
            .keys()
            .filter(|(_, l)| layers.contains(l))
            .map(|(m, _)| m.clone())
            .collect()
    }

    /// Names reachable from `roots` over `requires`/`optional` edges within
    /// `model`, the roots included. Edge targets need not be defined.
    pub fn reachable_layers(&self, model: &str, roots: &BTreeSet<LayerName>) -> BTreeSet<LayerName> {
        let mut seen: BTreeSet<LayerName> = roots.clone();
        let mut queue: VecDeque<LayerName> = roots.iter().cloned().collect();
        while let Some(name) = queue.pop_front() {
            if let Some(node) = self.layer(model, &name) {
                for next in node.requires.iter().chain(&node.optional) {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        seen
    }

    pub fn config(&self, model: &str, name: &str) -> Option<&CatalogConfig> {
        self.configs
            .get(&(ModelName::from(model), ConfigName::from(name)))
    }

    /// Default-flagged configs of `model`, ordered by name.
    pub fn default_configs(&self, model: &str) -> Vec<&CatalogConfig> {
        self.configs
            .iter()
            .filter(|((m, _), c)| m == model && c.default)
            .map(|(_, c)| c)
            .collect()
    }
}

/// Turn an unversioned coordinate into the version the channel lists.
pub fn resolve_version(
    channel: &dyn ChannelResolver,
    location: &FeaturePackCoordinate,
) -> Result<FeaturePackCoordinate, CoreError> {
    if location.version().is_some() {
        return Ok(location.clone());
    }
    let streams = channel.resolve_manifest(location)?;
    let stream = streams.first().ok_or_else(|| {
        CoreError::ArtifactResolution(format!(
            "{} is not listed by any configured channel",
            location.producer()
        ))
    })?;
    if streams.len() > 1 {
        debug!(
            "{} streams list {}, using {}",
            streams.len(),
            location.producer(),
            stream.version
        );
    }
    Ok(stream.coordinate())
}

pub(crate) fn resolution_error(error: BackendError) -> CoreError {
    match error {
        BackendError::Fetch { .. } | BackendError::MissingDescriptor(_) => {
            CoreError::ArtifactResolution(error.to_string())
        }
        other => CoreError::Backend(other),
    }
}

/// Fetch `location` and everything it depends on, breadth first, and
/// aggregate their descriptors.
pub fn read_catalog(
    backends: &Backends,
    location: &FeaturePackCoordinate,
) -> Result<Catalog, CoreError> {
    let root = resolve_version(backends.channel.as_ref(), location)?;
    let mut specs = Vec::new();
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([root.clone()]);

    while let Some(next) = queue.pop_front() {
        if !visited.insert(next.producer()) {
            continue;
        }
        let resolved = resolve_version(backends.channel.as_ref(), &next)?;
        backends
            .channel
            .fetch_artifact(&resolved)
            .map_err(resolution_error)?;
        let spec = backends
            .provisioning
            .read_feature_pack(&resolved)
            .map_err(resolution_error)?;
        debug!(
            "catalog: {} ({} layers, {} configs)",
            spec.location(),
            spec.layers.len(),
            spec.configs.len()
        );
        queue.extend(spec.feature_pack.dependencies.iter().cloned());
        specs.push(spec);
    }

    let catalog = Catalog::from_specs(root, &specs);
    info!(
        "catalog for {}: {} feature-packs, models [{}]",
        catalog.root(),
        specs.len(),
        catalog
            .models()
            .iter()
            .map(ModelName::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use provis_backend::MockBackend;
    use provis_schema::parse_feature_pack_str;
    use std::sync::Arc;

    const BASE: &str = r#"
[feature_pack]
location = "org.test:base-pack:1.0.0"

[[layers]]
model = "standalone"
name = "base-layer"

[[configs]]
model = "standalone"
name = "standalone.xml"
default = true
layers = ["base-layer"]
"#;

    const ADDED: &str = r#"
[feature_pack]
location = "org.test:added-pack:1.0.0"
dependencies = ["org.test:base-pack"]

[[layers]]
model = "standalone"
name = "layer1"
requires = ["base-layer"]
optional = ["undefined-layer"]

[[layers]]
model = "domain"
name = "layer1"

[[configs]]
model = "standalone"
name = "standalone.xml"
layers = ["layer1"]
"#;

    fn coord(s: &str) -> FeaturePackCoordinate {
        FeaturePackCoordinate::parse(s).unwrap()
    }

    fn catalog() -> Catalog {
        let specs = [
            parse_feature_pack_str(ADDED).unwrap(),
            parse_feature_pack_str(BASE).unwrap(),
        ];
        Catalog::from_specs(coord("org.test:added-pack:1.0.0"), &specs)
    }

    #[test]
    fn layers_grouped_by_model() {
        let catalog = catalog();
        assert_eq!(catalog.models().len(), 2);
        assert_eq!(catalog.layers_of("standalone").len(), 2);
        assert_eq!(catalog.layers_of("domain").len(), 1);
        assert_eq!(catalog.all_layer_names().len(), 2);
        assert!(catalog.has_model("domain"));
        assert!(!catalog.has_model("other"));
    }

    #[test]
    fn models_defining_layers() {
        let catalog = catalog();
        let layer1: BTreeSet<LayerName> = [LayerName::from("layer1")].into();
        assert_eq!(catalog.models_defining(&layer1).len(), 2);
        let base: BTreeSet<LayerName> = [LayerName::from("base-layer")].into();
        assert_eq!(
            catalog.models_defining(&base),
            [ModelName::from("standalone")].into()
        );
    }

    #[test]
    fn root_config_shadows_dependency_config() {
        let catalog = catalog();
        let config = catalog.config("standalone", "standalone.xml").unwrap();
        assert_eq!(config.owner.artifact_id(), "added-pack");
        assert!(!config.default);
        assert!(catalog.default_configs("standalone").is_empty());
    }

    #[test]
    fn lookups_are_keyed_by_model_and_name() {
        let catalog = catalog();
        let standalone = catalog.layer("standalone", "layer1").unwrap();
        assert!(standalone.requires.contains("base-layer"));
        let domain = catalog.layer("domain", "layer1").unwrap();
        assert!(domain.requires.is_empty());
        assert!(catalog.layer("domain", "base-layer").is_none());
        assert!(catalog.config("domain", "standalone.xml").is_none());
        assert!(catalog.config("standalone", "standalone.xml").is_some());
    }

    #[test]
    fn reachable_layers_follow_edges() {
        let catalog = catalog();
        let roots: BTreeSet<LayerName> = [LayerName::from("layer1")].into();
        let reachable = catalog.reachable_layers("standalone", &roots);
        assert!(reachable.contains("base-layer"));
        assert!(reachable.contains("undefined-layer"));
        assert_eq!(catalog.reachable_layers("domain", &roots).len(), 1);
    }

    #[test]
    fn read_catalog_walks_dependencies() {
        let mock = Arc::new(MockBackend::new());
        mock.add_descriptor(BASE).unwrap();
        mock.add_descriptor(ADDED).unwrap();
        let backends = Backends::from_mock(mock.clone());

        let catalog = read_catalog(&backends, &coord("org.test:added-pack")).unwrap();
        assert_eq!(catalog.root().version(), Some("1.0.0"));
        assert_eq!(catalog.feature_packs().len(), 2);
        assert_eq!(mock.read_count(), 2);
        assert_eq!(mock.fetch_count(), 2);
    }

    #[test]
    fn unlisted_feature_pack_fails_resolution() {
        let mock = Arc::new(MockBackend::new());
        let backends = Backends::from_mock(mock);
        assert!(matches!(
            read_catalog(&backends, &coord("org.test:missing")),
            Err(CoreError::ArtifactResolution(_))
        ));
    }

    #[test]
    fn unfetchable_dependency_fails_resolution() {
        let mock = Arc::new(MockBackend::new());
        mock.add_descriptor(BASE).unwrap();
        mock.add_descriptor(ADDED).unwrap();
        mock.mark_unfetchable(&coord("org.test:base-pack")).unwrap();
        let backends = Backends::from_mock(mock);
        assert!(matches!(
            read_catalog(&backends, &coord("org.test:added-pack:1.0.0")),
            Err(CoreError::ArtifactResolution(_))
        ));
    }
}
