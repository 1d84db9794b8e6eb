//! The merge engine: installed state + addition request -> candidate state.
//!
//! Everything here is a pure function of its inputs. The installed
//! [`ProvisioningConfig`] is never mutated; [`resolve_addition`] returns a new
//! value or fails without side effects.

use crate::catalog::Catalog;
use crate::CoreError;
use provis_schema::{
    ConfigId, ConfigName, Directness, FeaturePackCoordinate, FeaturePackDep, FeaturePackTemplate,
    LayerName, ModelName, NamedConfig, ProvisioningConfig, TemplatePlacement,
};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// What the caller asked to provision from the new feature-pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Everything the feature-pack provisions by default.
    Defaults,
    /// Only the listed configs.
    Configs(Vec<ConfigId>),
    /// Only the listed layers, merged into one target config.
    Layers {
        layers: BTreeSet<LayerName>,
        target: Option<ConfigId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRequest {
    pub location: FeaturePackCoordinate,
    pub selection: Selection,
}

impl AddRequest {
    pub fn defaults(location: FeaturePackCoordinate) -> Self {
        Self {
            location,
            selection: Selection::Defaults,
        }
    }

    pub fn configs(location: FeaturePackCoordinate, configs: Vec<ConfigId>) -> Self {
        Self {
            location,
            selection: Selection::Configs(configs),
        }
    }

    pub fn layers(
        location: FeaturePackCoordinate,
        layers: BTreeSet<LayerName>,
        target: Option<ConfigId>,
    ) -> Self {
        Self {
            location,
            selection: Selection::Layers { layers, target },
        }
    }
}

impl Selection {
    /// An empty layer set falls back to the config selection; an empty
    /// config list falls back to defaults.
    fn normalized(&self) -> Selection {
        match self {
            Selection::Layers { layers, target } if layers.is_empty() => match target {
                Some(id) => Selection::Configs(vec![id.clone()]),
                None => Selection::Defaults,
            },
            Selection::Configs(ids) if ids.is_empty() => Selection::Defaults,
            other => other.clone(),
        }
    }
}

/// Compute the provisioning config that results from adding
/// `request.location` to `installed`.
pub fn resolve_addition(
    installed: &ProvisioningConfig,
    request: &AddRequest,
    catalog: &Catalog,
    template: Option<&FeaturePackTemplate>,
) -> Result<ProvisioningConfig, CoreError> {
    if installed.has_direct_dep(&request.location) {
        return Err(CoreError::AlreadyInstalled {
            coordinate: request.location.to_string(),
        });
    }

    let mut candidate = installed.clone();
    let mut entry = FeaturePackDep::direct(request.location.clone());

    match request.selection.normalized() {
        Selection::Defaults => {}
        Selection::Configs(ids) => {
            for id in &ids {
                let resolved = resolve_config_id(catalog, id)?;
                debug!("selected config {resolved}");
                entry.included_configs.insert(resolved);
            }
            entry.inherit_configs = Some(false);
        }
        Selection::Layers { layers, target } => {
            let target = target.unwrap_or_default();
            let model = select_model(catalog, &layers, target.model.as_ref())?;
            check_layers(catalog, &model, &layers)?;
            let name = select_layer_target(catalog, installed, &model, target.name.as_ref())?;
            merge_layers(&mut candidate, &model, &name, &layers);
            entry.inherit_configs = Some(false);
            entry.inherit_packages = Some(false);
        }
    }

    if let Some(template) = template {
        entry
            .included_packages
            .extend(template.additional_packages.iter().cloned());
    }

    // A feature-pack that was only pulled in transitively becomes a
    // first-class entry.
    if let Some(pos) = candidate
        .transitive_deps
        .iter()
        .position(|d| d.location.same_producer(&entry.location))
    {
        let previous = candidate.transitive_deps.remove(pos);
        debug!("promoting transitive dependency {}", previous.location);
    }

    let placement = template.map_or(&TemplatePlacement::None, |t| &t.placement);
    place_entry(&mut candidate, entry, placement);

    candidate.validate()?;
    Ok(candidate)
}

fn place_entry(
    candidate: &mut ProvisioningConfig,
    mut entry: FeaturePackDep,
    placement: &TemplatePlacement,
) {
    match placement {
        TemplatePlacement::None => candidate.feature_pack_deps.push(entry),
        TemplatePlacement::Replace(target) => {
            match candidate
                .feature_pack_deps
                .iter()
                .position(|d| d.location.same_producer(target))
            {
                Some(pos) => {
                    let new_producer = entry.producer();
                    let replaced = std::mem::replace(&mut candidate.feature_pack_deps[pos], entry);
                    debug!("{new_producer} replaces {}", replaced.location);
                    // transitive entries follow their parent
                    let old_producer = replaced.producer();
                    for dep in &mut candidate.transitive_deps {
                        if dep.dependency_of.as_deref() == Some(old_producer.as_str()) {
                            dep.dependency_of = Some(new_producer.clone());
                        }
                    }
                }
                None => {
                    warn!(
                        "{} should replace {target}, which is not installed; adding it as a direct dependency",
                        entry.location
                    );
                    candidate.feature_pack_deps.push(entry);
                }
            }
        }
        TemplatePlacement::AttachTransitive(parent) => {
            if candidate.has_direct_dep(parent) {
                entry.directness = Directness::Transitive;
                entry.dependency_of = Some(parent.producer());
                candidate.transitive_deps.push(entry);
            } else {
                warn!(
                    "{} should be a dependency of {parent}, which is not installed; adding it as a direct dependency",
                    entry.location
                );
                candidate.feature_pack_deps.push(entry);
            }
        }
    }
}

fn resolve_config_id(catalog: &Catalog, id: &ConfigId) -> Result<ConfigId, CoreError> {
    let model = match &id.model {
        Some(model) => {
            if !catalog.has_model(model) {
                return Err(CoreError::ModelNotDefined {
                    model: Some(model.clone()),
                    candidates: catalog.models(),
                });
            }
            model.clone()
        }
        None => {
            let models = catalog.models();
            let mut iter = models.iter();
            match (iter.next(), iter.next()) {
                (Some(only), None) => only.clone(),
                _ => {
                    return Err(CoreError::ModelNotDefined {
                        model: None,
                        candidates: models.clone(),
                    })
                }
            }
        }
    };

    let name = match &id.name {
        Some(name) => name.clone(),
        None => default_config_name(catalog, &model)?,
    };
    if catalog.config(&model, &name).is_none() {
        return Err(CoreError::ConfigurationNotFound {
            model: model.to_string(),
            name: name.to_string(),
        });
    }
    Ok(ConfigId::new(model, name))
}

fn select_model(
    catalog: &Catalog,
    layers: &BTreeSet<LayerName>,
    requested: Option<&ModelName>,
) -> Result<ModelName, CoreError> {
    if let Some(model) = requested {
        if !catalog.has_model(model) {
            return Err(CoreError::ModelNotDefined {
                model: Some(model.clone()),
                candidates: catalog.models(),
            });
        }
        return Ok(model.clone());
    }

    let candidates = catalog.models_defining(layers);
    let mut iter = candidates.iter();
    match (iter.next(), iter.next()) {
        (Some(model), None) => Ok(model.clone()),
        (None, _) => Err(CoreError::LayerNotFound {
            requested: layers.clone(),
            supported: catalog.all_layer_names(),
        }),
        (Some(_), Some(_)) => Err(CoreError::ModelNotDefined {
            model: None,
            candidates,
        }),
    }
}

/// Every requested layer has to be known to `model`, either defined there or
/// reached over a dependency edge from another requested layer.
fn check_layers(
    catalog: &Catalog,
    model: &ModelName,
    layers: &BTreeSet<LayerName>,
) -> Result<(), CoreError> {
    let defined = catalog.layers_of(model);
    let roots: BTreeSet<LayerName> = layers.intersection(&defined).cloned().collect();
    let known = catalog.reachable_layers(model, &roots);
    let missing: BTreeSet<LayerName> = layers.difference(&known).cloned().collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CoreError::LayerNotFound {
            requested: missing,
            supported: catalog.all_layer_names(),
        })
    }
}

fn select_layer_target(
    catalog: &Catalog,
    installed: &ProvisioningConfig,
    model: &ModelName,
    name: Option<&ConfigName>,
) -> Result<ConfigName, CoreError> {
    match name {
        Some(name) => {
            if catalog.config(model, name).is_some()
                || installed.defined_config(model, name).is_some()
            {
                Ok(name.clone())
            } else {
                Err(CoreError::ConfigurationNotFound {
                    model: model.to_string(),
                    name: name.to_string(),
                })
            }
        }
        None => default_config_name(catalog, model),
    }
}

/// The single default config of `model`, or `<model>.xml` when the model
/// flags none.
fn default_config_name(catalog: &Catalog, model: &ModelName) -> Result<ConfigName, CoreError> {
    let defaults = catalog.default_configs(model);
    match defaults.as_slice() {
        [] => Ok(ConfigName::from(format!("{model}.xml"))),
        [only] => Ok(only.config.name.clone()),
        several => Err(CoreError::AmbiguousDefaultConfig {
            model: model.to_string(),
            candidates: several.iter().map(|c| c.config.name.to_string()).collect(),
        }),
    }
}

fn merge_layers(
    candidate: &mut ProvisioningConfig,
    model: &ModelName,
    name: &ConfigName,
    layers: &BTreeSet<LayerName>,
) {
    match candidate
        .defined_configs
        .iter_mut()
        .find(|c| c.matches(model, name))
    {
        Some(existing) => {
            for layer in layers {
                existing.include_layer(layer.clone());
            }
            debug!("merged {} layers into {model}/{name}", layers.len());
        }
        None => {
            let mut config = NamedConfig::new(model.clone(), name.clone());
            config.included_layers = layers.clone();
            debug!("defined {model}/{name} with {} layers", layers.len());
            candidate.defined_configs.push(config);
        }
    }
}
