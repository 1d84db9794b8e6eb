use super::{colorize_directness, json_pretty, STORE_PREFIX, EXIT_SUCCESS};
use provis_schema::{FeaturePackDep, LayerName};
use provis_store::{InstallLayout, LicenseStore, MetadataStore};
use std::path::Path;

fn dep_line(dep: &FeaturePackDep) -> String {
    let mut line = format!(
        "  {:<40} {}",
        dep.location.to_string(),
        colorize_directness(dep.directness)
    );
    if let Some(parent) = &dep.dependency_of {
        line.push_str(&format!(" (of {parent})"));
    }
    if dep.inherit_configs == Some(false) {
        line.push_str(" [explicit configs]");
    }
    line
}

pub fn run(root: &Path, json: bool) -> Result<u8, String> {
    let layout = InstallLayout::new(root);
    let record = MetadataStore::new(layout.clone())
        .load()
        .map_err(|e| format!("{STORE_PREFIX} {e}"))?;
    let licenses = LicenseStore::new(layout)
        .accepted()
        .map_err(|e| format!("{STORE_PREFIX} {e}"))?;

    if json {
        let payload = serde_json::json!({
            "installation": root,
            "updated_at": record.updated_at,
            "config": record.config,
            "accepted_licenses": licenses,
        });
        println!("{}", json_pretty(&payload)?);
        return Ok(EXIT_SUCCESS);
    }

    let config = &record.config;
    println!("installation: {}", root.display());
    println!("updated: {}", record.updated_at);
    if config.feature_pack_deps.is_empty() && config.transitive_deps.is_empty() {
        println!("no feature-packs installed");
    } else {
        println!("feature-packs:");
        for dep in config.all_deps() {
            println!("{}", dep_line(dep));
        }
    }
    if !config.defined_configs.is_empty() {
        println!("configs:");
        for named in &config.defined_configs {
            let layers: Vec<&str> = named.included_layers.iter().map(LayerName::as_str).collect();
            println!("  {}/{}  layers: {}", named.model, named.name, layers.join(", "));
            if !named.excluded_layers.is_empty() {
                let excluded: Vec<&str> =
                    named.excluded_layers.iter().map(LayerName::as_str).collect();
                println!("    excluded: {}", excluded.join(", "));
            }
        }
    }
    if !licenses.is_empty() {
        println!("accepted licenses:");
        for license in &licenses {
            println!("  {:<24} {}", license.id, license.title);
        }
    }
    Ok(EXIT_SUCCESS)
}
