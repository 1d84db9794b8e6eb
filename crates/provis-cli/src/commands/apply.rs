use super::{describe, json_pretty, open_installer, spin_fail, spin_ok, spinner, Overrides, EXIT_SUCCESS};
use std::path::Path;

pub fn run(root: &Path, overrides: &Overrides, staging: &Path, json: bool) -> Result<u8, String> {
    let installer = open_installer(root, overrides)?;

    let pb = (!json).then(|| spinner("applying candidate..."));
    let config = match installer.apply_candidate(staging) {
        Ok(config) => {
            if let Some(pb) = &pb {
                spin_ok(pb, "candidate applied");
            }
            config
        }
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "apply failed");
            }
            return Err(describe(&e));
        }
    };

    if json {
        let payload = serde_json::json!({
            "status": "applied",
            "installation": root,
            "config": config,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} now provisions {} feature-pack(s)",
            root.display(),
            config.feature_pack_deps.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
