use crate::coordinate::FeaturePackCoordinate;
use crate::types::PackageName;
use crate::SchemaError;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Where a newly added feature-pack lands in the provisioning config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TemplatePlacement {
    /// Appended as a direct dependency.
    #[default]
    None,
    /// Takes the slot of the named direct dependency.
    Replace(FeaturePackCoordinate),
    /// Recorded as a transitive dependency of the named direct dependency.
    AttachTransitive(FeaturePackCoordinate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePackTemplate {
    pub feature_pack: FeaturePackCoordinate,
    pub additional_packages: Vec<PackageName>,
    pub placement: TemplatePlacement,
    pub requires_license_acceptance: bool,
}

impl FeaturePackTemplate {
    pub fn new(feature_pack: FeaturePackCoordinate) -> Self {
        Self {
            feature_pack,
            additional_packages: Vec::new(),
            placement: TemplatePlacement::None,
            requires_license_acceptance: false,
        }
    }

    #[must_use]
    pub fn with_packages<I, P>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PackageName>,
    {
        self.additional_packages
            .extend(packages.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_placement(mut self, placement: TemplatePlacement) -> Self {
        self.placement = placement;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateEntry {
    feature_pack: FeaturePackCoordinate,
    #[serde(default)]
    additional_packages: Vec<PackageName>,
    #[serde(default)]
    replaces: Option<FeaturePackCoordinate>,
    #[serde(default)]
    transitive_dependency_of: Option<FeaturePackCoordinate>,
    #[serde(default)]
    requires_license_acceptance: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TemplateFile {
    #[serde(default)]
    templates: Vec<TemplateEntry>,
}

impl TryFrom<TemplateEntry> for FeaturePackTemplate {
    type Error = SchemaError;

    fn try_from(entry: TemplateEntry) -> Result<Self, Self::Error> {
        let placement = match (entry.replaces, entry.transitive_dependency_of) {
            (Some(_), Some(_)) => {
                return Err(SchemaError::ConflictingPlacement {
                    feature_pack: entry.feature_pack.to_string(),
                })
            }
            (Some(target), None) => TemplatePlacement::Replace(target),
            (None, Some(parent)) => TemplatePlacement::AttachTransitive(parent),
            (None, None) => TemplatePlacement::None,
        };
        Ok(Self {
            feature_pack: entry.feature_pack,
            additional_packages: entry.additional_packages,
            placement,
            requires_license_acceptance: entry.requires_license_acceptance,
        })
    }
}

/// Templates keyed by feature-pack producer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSet {
    templates: Vec<FeaturePackTemplate>,
}

impl TemplateSet {
    pub fn new(templates: Vec<FeaturePackTemplate>) -> Result<Self, SchemaError> {
        for (i, t) in templates.iter().enumerate() {
            if templates[..i]
                .iter()
                .any(|other| other.feature_pack.same_producer(&t.feature_pack))
            {
                return Err(SchemaError::DuplicateTemplate(t.feature_pack.producer()));
            }
        }
        Ok(Self { templates })
    }

    pub fn find(&self, location: &FeaturePackCoordinate) -> Option<&FeaturePackTemplate> {
        self.templates
            .iter()
            .find(|t| t.feature_pack.same_producer(location))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

pub fn parse_templates_str(input: &str) -> Result<TemplateSet, SchemaError> {
    let file: TemplateFile = toml::from_str(input)?;
    let templates = file
        .templates
        .into_iter()
        .map(FeaturePackTemplate::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    TemplateSet::new(templates)
}

pub fn parse_templates_file(path: impl AsRef<Path>) -> Result<TemplateSet, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_templates_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(s: &str) -> FeaturePackCoordinate {
        FeaturePackCoordinate::parse(s).unwrap()
    }

    #[test]
    fn parses_placements() {
        let set = parse_templates_str(
            r#"
[[templates]]
feature_pack = "org.test:plain"
additional_packages = ["docs.examples"]

[[templates]]
feature_pack = "org.test:replacing"
replaces = "org.test:base-pack"

[[templates]]
feature_pack = "org.test:attached"
transitive_dependency_of = "org.test:base-pack"
requires_license_acceptance = true
"#,
        )
        .expect("should parse");
        assert_eq!(set.len(), 3);

        let plain = set.find(&coord("org.test:plain:2.0")).unwrap();
        assert_eq!(plain.placement, TemplatePlacement::None);
        assert_eq!(plain.additional_packages, vec![PackageName::from("docs.examples")]);

        let replacing = set.find(&coord("org.test:replacing")).unwrap();
        assert_eq!(
            replacing.placement,
            TemplatePlacement::Replace(coord("org.test:base-pack"))
        );

        let attached = set.find(&coord("org.test:attached")).unwrap();
        assert!(attached.requires_license_acceptance);
        assert!(matches!(
            attached.placement,
            TemplatePlacement::AttachTransitive(_)
        ));
    }

    #[test]
    fn rejects_both_placements() {
        let err = parse_templates_str(
            r#"
[[templates]]
feature_pack = "org.test:both"
replaces = "org.test:a"
transitive_dependency_of = "org.test:b"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::ConflictingPlacement { .. }));
    }

    #[test]
    fn rejects_duplicate_producers() {
        let err = parse_templates_str(
            r#"
[[templates]]
feature_pack = "org.test:dup:1.0"

[[templates]]
feature_pack = "org.test:dup:2.0"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateTemplate(p) if p == "org.test:dup"));
    }

    #[test]
    fn empty_file_has_no_templates() {
        let set = parse_templates_str("").unwrap();
        assert!(set.is_empty());
        assert!(set.find(&coord("org.test:any")).is_none());
    }
}
