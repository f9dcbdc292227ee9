use crate::cmd;
use crate::output::{print_json, print_table};
use crate::settings::Settings;
use cma_core::client::ApiClient;
use cma_core::credentials::Credentials;
use cma_core::notify::PendingNotifications;

pub fn run(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let statuses = cmd::runtime()?.block_on(async {
        // probing is local; a token is only needed for reporting
        let jwt = Credentials::new(&settings.etc).load_jwt().unwrap_or_default();
        let api = &settings.config.api;
        let client = ApiClient::new(&api.url, api.timeout.get(), jwt)?;
        let engine = cmd::engine(settings, client, &PendingNotifications::new())?;
        anyhow::Ok(engine.probe_status().await?)
    })?;

    if json {
        return print_json(&statuses);
    }
    if statuses.is_empty() {
        println!("No installed collectors with a status command.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = statuses
        .iter()
        .map(|s| {
            let data = &s.result.status_data;
            vec![
                s.collector.clone(),
                s.collector_id.clone(),
                s.result.status.clone(),
                data.substatus.clone(),
                data.exit_code.to_string(),
                data.error.clone(),
            ]
        })
        .collect();
    print_table(
        &["COLLECTOR", "ID", "STATUS", "SUBSTATUS", "EXIT", "ERROR"],
        &rows,
    );
    Ok(())
}
