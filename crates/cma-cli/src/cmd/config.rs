use crate::output::{print_json, print_yaml};
use crate::settings::Settings;
use clap::Subcommand;
use cma_core::config::WarnLevel;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective config, after flag and env overrides
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(settings: &Settings, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(settings, json),
        ConfigSubcommand::Validate => validate(settings, json),
    }
}

fn show(settings: &Settings, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(&settings.config)
    } else {
        println!("# {}", settings.config_path.display());
        print_yaml(&settings.config)
    }
}

fn validate(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let warnings = settings.config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
