use crate::CoreError;
use provis_schema::{parse_templates_file, FeaturePackCoordinate, FeaturePackTemplate, TemplateSet};
use std::path::Path;
use tracing::debug;

/// Looks up the template that steers how a feature-pack is added.
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, location: &FeaturePackCoordinate) -> Option<FeaturePackTemplate>;
}

impl TemplateResolver for TemplateSet {
    fn resolve(&self, location: &FeaturePackCoordinate) -> Option<FeaturePackTemplate> {
        self.find(location).cloned()
    }
}

/// Resolver for installations without a templates file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTemplates;

impl TemplateResolver for NoTemplates {
    fn resolve(&self, _location: &FeaturePackCoordinate) -> Option<FeaturePackTemplate> {
        None
    }
}

pub fn load_templates(path: Option<&Path>) -> Result<Box<dyn TemplateResolver>, CoreError> {
    match path {
        None => Ok(Box::new(NoTemplates)),
        Some(path) => {
            let set = parse_templates_file(path)?;
            debug!("loaded {} templates from {}", set.len(), path.display());
            Ok(Box::new(set))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provis_schema::TemplatePlacement;

    #[test]
    fn set_resolves_by_producer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("templates.toml");
        std::fs::write(
            &path,
            r#"
[[templates]]
feature_pack = "org.test:added-pack"
additional_packages = ["extra.module"]
replaces = "org.test:legacy-pack"
"#,
        )
        .unwrap();

        let resolver = load_templates(Some(&path)).unwrap();
        let location = FeaturePackCoordinate::parse("org.test:added-pack:2.0.0").unwrap();
        let template = resolver.resolve(&location).unwrap();
        assert_eq!(template.additional_packages.len(), 1);
        assert!(matches!(template.placement, TemplatePlacement::Replace(_)));

        let other = FeaturePackCoordinate::parse("org.test:other").unwrap();
        assert!(resolver.resolve(&other).is_none());
    }

    #[test]
    fn no_templates_resolves_nothing() {
        let resolver = load_templates(None).unwrap();
        let location = FeaturePackCoordinate::parse("org.test:added-pack").unwrap();
        assert!(resolver.resolve(&location).is_none());
    }

    #[test]
    fn missing_templates_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_templates(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
