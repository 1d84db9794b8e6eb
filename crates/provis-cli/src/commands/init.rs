use super::{describe, json_pretty, Overrides, EXIT_SUCCESS};
use provis_backend::InstallerConfig;
use provis_core::Installer;
use std::path::Path;

pub fn run(root: &Path, overrides: &Overrides, json: bool) -> Result<u8, String> {
    let settings = overrides.apply_to(InstallerConfig::default())?;
    let config = Installer::init(root, &settings).map_err(|e| describe(&e))?;

    if json {
        let payload = serde_json::json!({
            "status": "initialized",
            "installation": root,
            "settings": settings,
            "config": config,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("initialized installation at {}", root.display());
        if let Some(repo) = &settings.repository {
            println!("repository: {}", repo.display());
        }
        if let Some(channel) = &settings.channel {
            println!("channel: {}", channel.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
