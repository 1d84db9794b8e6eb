use super::{describe, json_pretty, open_installer, Overrides, EXIT_SUCCESS};
use std::path::Path;

pub fn run(root: &Path, overrides: &Overrides, staging: &Path, json: bool) -> Result<u8, String> {
    let installer = open_installer(root, overrides)?;
    let removed = installer
        .discard_candidate(staging)
        .map_err(|e| describe(&e))?;

    if json {
        let payload = serde_json::json!({
            "staging": staging,
            "discarded": removed,
        });
        println!("{}", json_pretty(&payload)?);
    } else if removed {
        println!("discarded candidate {}", staging.display());
    } else {
        println!("no candidate at {}", staging.display());
    }
    Ok(EXIT_SUCCESS)
}
