//! Core of the provis installer.
//!
//! This crate turns a feature-pack addition request into a validated
//! provisioning config and stages it for atomic promotion. `resolve` holds
//! the pure merge engine, `catalog` aggregates layers and configs over a
//! feature-pack's dependency closure, `staging` implements the two-phase
//! prepare/apply protocol, and `Installer` ties them to the persisted
//! installation under a single-writer lock.

pub mod catalog;
pub mod concurrency;
pub mod engine;
pub mod lifecycle;
pub mod resolve;
pub mod staging;
pub mod template;

pub use catalog::{read_catalog, Catalog};
pub use concurrency::{install_signal_handler, shutdown_requested, InstallLock};
pub use engine::{Installer, PendingLicenses, PreparedCandidate};
pub use lifecycle::{validate_transition, AddOperation, AddPhase};
pub use resolve::{resolve_addition, AddRequest, Selection};
pub use template::{load_templates, NoTemplates, TemplateResolver};

use provis_schema::{CoordinateError, LayerName, ModelName};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

fn join_names<T: AsRef<str>>(names: &BTreeSet<T>) -> String {
    names
        .iter()
        .map(AsRef::<str>::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

fn model_problem(model: Option<&ModelName>) -> String {
    match model {
        Some(m) => format!("model '{m}' is not defined by the feature-pack"),
        None => "the requested layers span several models, select one".to_owned(),
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    InvalidCoordinate(#[from] CoordinateError),
    #[error("feature-pack {coordinate} is already installed")]
    AlreadyInstalled { coordinate: String },
    #[error(
        "layers not found: [{}]; supported layers: [{}]",
        join_names(requested),
        join_names(supported)
    )]
    LayerNotFound {
        requested: BTreeSet<LayerName>,
        supported: BTreeSet<LayerName>,
    },
    #[error(
        "{}; candidate models: [{}]",
        model_problem(model.as_ref()),
        join_names(candidates)
    )]
    ModelNotDefined {
        model: Option<ModelName>,
        candidates: BTreeSet<ModelName>,
    },
    #[error("configuration '{name}' not found in model '{model}'")]
    ConfigurationNotFound { model: String, name: String },
    #[error(
        "model '{model}' declares several default configurations: [{}]",
        candidates.join(", ")
    )]
    AmbiguousDefaultConfig {
        model: String,
        candidates: Vec<String>,
    },
    #[error("artifact resolution failed: {0}")]
    ArtifactResolution(String),
    #[error("descriptor error: {0}")]
    Schema(#[from] provis_schema::SchemaError),
    #[error("backend error: {0}")]
    Backend(#[from] provis_backend::BackendError),
    #[error("store error: {0}")]
    Store(#[from] provis_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid operation transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),
    #[error("installation '{}' is locked by another operation", .0.display())]
    Busy(PathBuf),
    #[error("'{}' is already an installation", .0.display())]
    AlreadyInitialized(PathBuf),
    #[error("operation cancelled")]
    Cancelled,
}

impl CoreError {
    /// Errors the caller can fix by changing the request.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidCoordinate(_)
                | CoreError::AlreadyInstalled { .. }
                | CoreError::LayerNotFound { .. }
                | CoreError::ModelNotDefined { .. }
                | CoreError::ConfigurationNotFound { .. }
                | CoreError::AmbiguousDefaultConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_not_found_lists_both_sets() {
        let e = CoreError::LayerNotFound {
            requested: ["missing"].into_iter().map(LayerName::from).collect(),
            supported: ["a", "b"].into_iter().map(LayerName::from).collect(),
        };
        let msg = e.to_string();
        assert!(msg.contains("[missing]"));
        assert!(msg.contains("[a, b]"));
        assert!(e.is_validation());
    }

    #[test]
    fn model_not_defined_names_model() {
        let e = CoreError::ModelNotDefined {
            model: Some(ModelName::from("model2")),
            candidates: BTreeSet::new(),
        };
        assert!(e.to_string().contains("'model2'"));

        let e = CoreError::ModelNotDefined {
            model: None,
            candidates: ["m1", "m2"].into_iter().map(ModelName::from).collect(),
        };
        assert!(e.to_string().contains("m1, m2"));
    }

    #[test]
    fn coordinate_errors_echo_input() {
        let e = CoreError::from(provis_schema::FeaturePackCoordinate::parse("a:b:c:d").unwrap_err());
        assert!(e.to_string().contains("a:b:c:d"));
        assert!(e.is_validation());
        assert!(!CoreError::Cancelled.is_validation());
    }
}
