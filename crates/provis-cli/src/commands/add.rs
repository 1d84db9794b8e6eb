use super::{
    absolute, describe, json_pretty, open_installer, spin_fail, spin_ok, spinner, Overrides,
    EXIT_SUCCESS,
};
use dialoguer::Confirm;
use provis_core::{Installer, PendingLicenses, PreparedCandidate};
use provis_schema::{ConfigId, LayerName};
use std::collections::BTreeSet;
use std::io::{stderr, stdin, IsTerminal};
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct AddOptions {
    pub layers: Vec<LayerName>,
    pub configs: Vec<ConfigId>,
    pub staging: Option<PathBuf>,
    pub stage_only: bool,
    pub accept_licenses: bool,
}

/// `<parent>/<name>.staged`, next to the installation so promotion is a rename.
fn default_staging(root: &Path) -> Result<PathBuf, String> {
    let root = absolute(root)?;
    match (root.parent(), root.file_name()) {
        (Some(parent), Some(name)) => {
            Ok(parent.join(format!("{}.staged", name.to_string_lossy())))
        }
        _ => Err(format!(
            "cannot derive a staging directory for {} (pass --staging-dir)",
            root.display()
        )),
    }
}

fn stage(
    installer: &Installer,
    coordinate: &str,
    options: &AddOptions,
    staging: &Path,
) -> Result<PreparedCandidate, String> {
    let result = if options.layers.is_empty() {
        installer.add_feature_pack(coordinate, &options.configs, staging)
    } else {
        let target = match options.configs.as_slice() {
            [] => None,
            [target] => Some(target.clone()),
            _ => return Err("--layers accepts at most one --config target".to_owned()),
        };
        let layers: BTreeSet<LayerName> = options.layers.iter().cloned().collect();
        installer.add_feature_pack_with_layers(coordinate, layers, target, staging)
    };
    result.map_err(|e| describe(&e))
}

/// Whether the newly accepted licenses may be recorded.
fn confirm_licenses(pending: &PendingLicenses, accept: bool, json: bool) -> Result<bool, String> {
    if pending.licenses.is_empty() || (accept && !pending.requires_prompt) {
        return Ok(true);
    }
    if json || !(stdin().is_terminal() && stderr().is_terminal()) {
        return Ok(false);
    }

    eprintln!("{} comes with license agreements:", pending.feature_pack);
    for license in &pending.licenses {
        eprintln!("  {} ({})", license.title, license.id);
        if !license.text.is_empty() {
            for line in license.text.lines() {
                eprintln!("      {line}");
            }
        }
    }
    Confirm::new()
        .with_prompt("accept these license agreements?")
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))
}

fn print_result(
    candidate: &PreparedCandidate,
    applied: bool,
    root: &Path,
    json: bool,
) -> Result<(), String> {
    if json {
        let payload = serde_json::json!({
            "status": if applied { "applied" } else { "staged" },
            "feature_pack": candidate.feature_pack,
            "installation": root,
            "staging": candidate.staging,
            "config": candidate.config,
            "accepted_licenses": candidate.accepted_licenses,
        });
        println!("{}", json_pretty(&payload)?);
    } else if applied {
        println!("added {} to {}", candidate.feature_pack, root.display());
    } else {
        println!(
            "staged {} in {}",
            candidate.feature_pack,
            candidate.staging.display()
        );
        println!("promote with: provis apply {}", candidate.staging.display());
    }
    Ok(())
}

pub fn run(
    root: &Path,
    overrides: &Overrides,
    coordinate: &str,
    options: &AddOptions,
    json: bool,
) -> Result<u8, String> {
    let installer = open_installer(root, overrides)?;
    let staging = match &options.staging {
        Some(dir) => absolute(dir)?,
        None => default_staging(root)?,
    };

    let pb = (!json).then(|| spinner(&format!("resolving {coordinate}...")));
    let candidate = match stage(&installer, coordinate, options, &staging) {
        Ok(candidate) => {
            if let Some(pb) = &pb {
                spin_ok(pb, "candidate prepared");
            }
            candidate
        }
        Err(msg) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "add failed");
            }
            return Err(msg);
        }
    };

    if options.stage_only {
        print_result(&candidate, false, root, json)?;
        return Ok(EXIT_SUCCESS);
    }

    let pending = installer
        .pending_licenses(&candidate.feature_pack.to_string())
        .map_err(|e| describe(&e))?;
    if !confirm_licenses(&pending, options.accept_licenses, json)? {
        if let Err(e) = installer.discard_candidate(&candidate.staging) {
            warn!("failed to discard candidate: {e}");
        }
        return Err(if pending.requires_prompt {
            format!(
                "license agreements of {} must be confirmed interactively",
                candidate.feature_pack
            )
        } else {
            "license agreements not accepted (pass --accept-license-agreements)".to_owned()
        });
    }

    installer.promote(&candidate).map_err(|e| describe(&e))?;
    print_result(&candidate, true, root, json)?;
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_defaults_next_to_installation() {
        let staging = default_staging(Path::new("/srv/server")).unwrap();
        assert_eq!(staging, Path::new("/srv/server.staged"));
    }

    #[test]
    fn filesystem_root_has_no_default_staging() {
        assert!(default_staging(Path::new("/")).is_err());
    }

    #[test]
    fn no_pending_licenses_needs_no_confirmation() {
        let pending = PendingLicenses {
            feature_pack: "org.test:pack:1.0".parse().unwrap(),
            licenses: Vec::new(),
            requires_prompt: true,
        };
        assert!(confirm_licenses(&pending, false, true).unwrap());
    }

    #[test]
    fn template_prompt_overrides_preacceptance() {
        let pending = PendingLicenses {
            feature_pack: "org.test:pack:1.0".parse().unwrap(),
            licenses: vec![provis_schema::LicenseRecord {
                id: "eula".to_owned(),
                owning_feature_pack: "org.test:pack:1.0".parse().unwrap(),
                title: "EULA".to_owned(),
                text: String::new(),
            }],
            requires_prompt: true,
        };
        // json mode cannot prompt
        assert!(!confirm_licenses(&pending, true, true).unwrap());

        let pending = PendingLicenses {
            requires_prompt: false,
            ..pending
        };
        assert!(confirm_licenses(&pending, true, true).unwrap());
        assert!(!confirm_licenses(&pending, false, true).unwrap());
    }
}
