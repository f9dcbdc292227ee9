use crate::output::{print_json, print_table};
use crate::settings::Settings;
use anyhow::Context;
use clap::Subcommand;
use cma_core::inventory::{InstalledCollectors, Inventory};
use cma_core::paths;
use cma_core::platform::Platform;

#[derive(Subcommand)]
pub enum InventorySubcommand {
    /// List collectors known for a platform and their install state
    List {
        /// Platform key to list (default: this host's platform)
        #[arg(long)]
        platform: Option<String>,
    },
}

pub fn run(settings: &Settings, subcmd: InventorySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        InventorySubcommand::List { platform } => list(settings, platform.as_deref(), json),
    }
}

fn list(settings: &Settings, platform: Option<&str>, json: bool) -> anyhow::Result<()> {
    let platform = platform.map_or_else(Platform::current, Platform::from_os);
    let inventory = Inventory::load(&paths::inventory_path(&settings.etc))
        .context("failed to load inventory")?;
    let collectors = inventory.for_platform(&platform);

    // agents.yaml only exists once collectors have been registered
    let installed_path = paths::installed_path(&settings.etc);
    let installed = if installed_path.exists() {
        InstalledCollectors::load(&installed_path)?
    } else {
        InstalledCollectors::default()
    };

    if json {
        let items: Vec<serde_json::Value> = collectors
            .iter()
            .map(|(name, c)| {
                serde_json::json!({
                    "name": name,
                    "collector_id": installed.id_for_type(name),
                    "reload": c.reload.to_string(),
                    "config_files": c.config_files,
                })
            })
            .collect();
        return print_json(&items);
    }

    if collectors.is_empty() {
        println!("No collectors defined for {platform}.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = collectors
        .iter()
        .map(|(name, c)| {
            vec![
                name.clone(),
                installed.id_for_type(name).unwrap_or("-").to_string(),
                if c.reload.is_none() {
                    "-".to_string()
                } else {
                    c.reload.to_string()
                },
                c.config_files.len().to_string(),
            ]
        })
        .collect();
    print_table(&["COLLECTOR", "ID", "RELOAD", "CONFIGS"], &rows);
    Ok(())
}
