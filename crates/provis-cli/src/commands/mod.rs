pub mod add;
pub mod apply;
pub mod available;
pub mod completions;
pub mod discard;
pub mod init;
pub mod show;

use indicatif::{ProgressBar, ProgressStyle};
use provis_backend::InstallerConfig;
use provis_core::{CoreError, Installer};
use provis_schema::Directness;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_VALIDATION_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

pub const VALIDATION_PREFIX: &str = "validation error:";
pub const STORE_PREFIX: &str = "store error:";

/// Collaborator settings given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub repository: Option<PathBuf>,
    pub channel: Option<PathBuf>,
    pub templates: Option<PathBuf>,
}

impl Overrides {
    /// Apply on top of `base`, making paths absolute so the persisted
    /// settings survive a change of working directory.
    pub fn apply_to(&self, base: InstallerConfig) -> Result<InstallerConfig, String> {
        Ok(base.with_overrides(
            absolute_opt(self.repository.as_deref())?,
            absolute_opt(self.channel.as_deref())?,
            absolute_opt(self.templates.as_deref())?,
        ))
    }
}

fn absolute_opt(path: Option<&Path>) -> Result<Option<PathBuf>, String> {
    path.map(absolute).transpose()
}

pub fn absolute(path: &Path) -> Result<PathBuf, String> {
    std::path::absolute(path).map_err(|e| format!("invalid path {}: {e}", path.display()))
}

/// Render a core error with the prefix `main` maps to an exit code.
pub fn describe(err: &CoreError) -> String {
    if err.is_validation() {
        format!("{VALIDATION_PREFIX} {err}")
    } else if matches!(
        err,
        CoreError::Store(_) | CoreError::Busy(_) | CoreError::InvalidCandidate(_)
    ) {
        format!("{STORE_PREFIX} {err}")
    } else {
        err.to_string()
    }
}

/// Open the installation at `root` with its persisted settings plus `overrides`.
pub fn open_installer(root: &Path, overrides: &Overrides) -> Result<Installer, String> {
    let settings = Installer::load_settings(root).map_err(|e| describe(&e))?;
    let settings = overrides.apply_to(settings)?;
    Installer::from_config(root, &settings).map_err(|e| describe(&e))
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish(pb: &ProgressBar, msg: String) {
    if let Ok(style) = ProgressStyle::with_template("{msg}") {
        pb.set_style(style);
    }
    pb.finish_with_message(msg);
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    finish(pb, format!("✗ {msg}"));
}

pub fn colorize_directness(directness: Directness) -> String {
    use console::Style;
    let text = directness.to_string();
    match directness {
        Directness::Direct => Style::new().green().apply_to(text).to_string(),
        Directness::Transitive => Style::new().dim().apply_to(text).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provis_schema::{CoordinateError, LayerName};
    use std::collections::BTreeSet;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn validation_errors_get_validation_prefix() {
        let err = CoreError::LayerNotFound {
            requested: BTreeSet::from([LayerName::from("nope")]),
            supported: BTreeSet::new(),
        };
        assert!(describe(&err).starts_with(VALIDATION_PREFIX));

        let err = CoreError::InvalidCoordinate(CoordinateError::Empty);
        assert!(describe(&err).starts_with(VALIDATION_PREFIX));
    }

    #[test]
    fn lock_contention_is_a_store_error() {
        let err = CoreError::Busy(PathBuf::from("/srv/server"));
        assert!(describe(&err).starts_with(STORE_PREFIX));
    }

    #[test]
    fn generic_errors_have_no_prefix() {
        let msg = describe(&CoreError::Cancelled);
        assert!(!msg.starts_with(VALIDATION_PREFIX));
        assert!(!msg.starts_with(STORE_PREFIX));
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let base = InstallerConfig {
            channel: Some(PathBuf::from("/srv/channel.toml")),
            ..InstallerConfig::default()
        };
        let overrides = Overrides {
            repository: Some(PathBuf::from("/srv/repo")),
            ..Overrides::default()
        };
        let merged = overrides.apply_to(base).unwrap();
        assert_eq!(merged.repository.as_deref(), Some(Path::new("/srv/repo")));
        assert_eq!(merged.channel.as_deref(), Some(Path::new("/srv/channel.toml")));
        assert!(merged.templates.is_none());
    }

    #[test]
    fn relative_overrides_become_absolute() {
        let overrides = Overrides {
            channel: Some(PathBuf::from("channel.toml")),
            ..Overrides::default()
        };
        let merged = overrides.apply_to(InstallerConfig::default()).unwrap();
        assert!(merged.channel.unwrap().is_absolute());
    }

    #[test]
    fn directness_is_colorized_text() {
        assert!(colorize_directness(Directness::Direct).contains("direct"));
        assert!(colorize_directness(Directness::Transitive).contains("transitive"));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_VALIDATION_ERROR);
        assert_ne!(EXIT_VALIDATION_ERROR, EXIT_STORE_ERROR);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
