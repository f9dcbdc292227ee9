use crate::cmd;
use crate::output::{print_json, print_table};
use crate::settings::Settings;
use clap::Subcommand;
use cma_core::notify::PendingNotifications;

#[derive(Subcommand)]
pub enum DriftSubcommand {
    /// Run one verification pass over every tracked config file
    Check,
}

pub fn run(settings: &Settings, subcmd: DriftSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        DriftSubcommand::Check => check(settings, json),
    }
}

fn check(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let entries = cmd::runtime()?.block_on(async {
        let client = cmd::client(settings)?;
        let engine = cmd::engine(settings, client, &PendingNotifications::new())?;
        anyhow::Ok(engine.check_drift().await?)
    })?;

    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No tracked config files.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            let result = match (&e.outcome, &e.error) {
                (_, Some(err)) => format!("error: {err}"),
                (Some(o), None) => o.as_str().to_string(),
                (None, None) => String::new(),
            };
            vec![e.collector.clone(), e.path.display().to_string(), result]
        })
        .collect();
    print_table(&["COLLECTOR", "PATH", "RESULT"], &rows);

    if entries.iter().any(|e| e.error.is_some()) {
        anyhow::bail!("drift check could not verify every file");
    }
    Ok(())
}
