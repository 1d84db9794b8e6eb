use super::{describe, json_pretty, open_installer, Overrides, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;

pub fn run(root: &Path, overrides: &Overrides, coordinate: &str, json: bool) -> Result<u8, String> {
    let installer = open_installer(root, overrides)?;
    let available = installer
        .is_feature_pack_available(coordinate)
        .map_err(|e| describe(&e))?;

    if json {
        let payload = serde_json::json!({
            "feature_pack": coordinate,
            "available": available,
        });
        println!("{}", json_pretty(&payload)?);
    } else if available {
        println!("{coordinate} is available");
    } else {
        println!("{coordinate} is not available from the configured channels");
    }
    Ok(if available { EXIT_SUCCESS } else { EXIT_FAILURE })
}
