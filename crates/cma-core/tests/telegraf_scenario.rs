//! Full action cycle against a mocked control plane.

use async_trait::async_trait;
use cma_core::client::ApiClient;
use cma_core::engine::{Engine, EngineOptions};
use cma_core::executor::{CommandExecutor, CommandOutput};
use cma_core::installer::ReloadMode;
use cma_core::inventory::{
    Collector, Collectors, InstalledCollector, InstalledCollectors, Inventory, ReloadDescriptor,
};
use cma_core::paths;
use cma_core::platform::{LinuxOps, Platform};
use cma_core::tracker::{checksum_file, TrackerRecord, VerifyOutcome};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandExecutor for Recorder {
    async fn execute(&self, command_line: &str) -> CommandOutput {
        self.calls.lock().unwrap().push(command_line.to_string());
        CommandOutput::default()
    }
}

fn seed(etc: &Path) {
    let telegraf = Collector {
        reload: ReloadDescriptor::parse("restart"),
        restart: "systemctl restart telegraf".to_string(),
        ..Collector::default()
    };
    let linux: Collectors = BTreeMap::from([("telegraf".to_string(), telegraf)]);
    Inventory(BTreeMap::from([("linux".to_string(), linux)]))
        .save(&paths::inventory_path(etc))
        .unwrap();
    InstalledCollectors(vec![InstalledCollector {
        collector_id: "col-7".to_string(),
        collector_type_id: "telegraf".to_string(),
    }])
    .save(&paths::installed_path(etc))
    .unwrap();
}

fn engine(etc: &Path, api: &str, exec: Arc<Recorder>) -> Engine {
    let client = ApiClient::new(api, Duration::from_secs(5), "jwt").unwrap();
    Engine::new(
        client,
        EngineOptions {
            etc: etc.to_path_buf(),
            platform: Platform::Linux,
            reload_mode: ReloadMode::Direct,
            executor: exec,
            ops: Arc::new(LinuxOps),
            reload_timeout: Duration::from_secs(5),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn install_restart_then_detect_drift() {
    let dir = TempDir::new().unwrap();
    let etc = dir.path().join("etc");
    seed(&etc);
    let target = dir.path().join("t.conf");

    let payload = serde_json::json!([{
        "type": "config",
        "configs": {"telegraf": [{"id": "c1", "path": target, "contents": "dGVzdAo="}]}
    }]);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collector/update")
        .with_status(200)
        .with_body(payload.to_string())
        .create_async()
        .await;
    let result = server
        .mock("POST", "/collector/update")
        .match_body(mockito::Matcher::Json(serde_json::json!({
            "config_assignment_id": "c1",
            "status": "active",
            "data": {"write_result": "OK"}
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;
    let drift = server
        .mock("PUT", "/collector/col-7/config_assignment/c1")
        .match_body(mockito::Matcher::Json(serde_json::json!({"status": "modified"})))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let exec = Arc::new(Recorder::default());
    let engine = engine(&etc, &server.url(), exec.clone());

    let summary = engine.run_cycle().await.unwrap();
    assert_eq!(summary.configs, 1);
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "test\n");
    assert_eq!(
        *exec.calls.lock().unwrap(),
        vec!["systemctl restart telegraf".to_string()]
    );
    result.assert_async().await;

    let record = TrackerRecord::load(&engine.tracker().record_path("telegraf", &target))
        .unwrap()
        .unwrap();
    assert_eq!(record.checksum, checksum_file(&target).unwrap());
    assert_eq!(record.collector_id, "col-7");

    // untouched file: no network
    let entries = engine.check_drift().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Some(VerifyOutcome::Unchanged));

    // out-of-band edit is reported once
    std::fs::write(&target, "tampered\n").unwrap();
    let first = engine.check_drift().await.unwrap();
    let second = engine.check_drift().await.unwrap();
    assert_eq!(first[0].outcome, Some(VerifyOutcome::Reported));
    assert_eq!(second[0].outcome, Some(VerifyOutcome::AlreadyReported));
    drift.assert_async().await;
}

#[tokio::test]
async fn partial_failure_installs_only_known_config_id() {
    let dir = TempDir::new().unwrap();
    let etc = dir.path().join("etc");
    seed(&etc);

    // give telegraf a config file id to resolve against
    let mut inv = Inventory::load(&paths::inventory_path(&etc)).unwrap();
    let main = dir.path().join("telegraf.conf");
    inv.0
        .get_mut("linux")
        .unwrap()
        .get_mut("telegraf")
        .unwrap()
        .config_files
        .insert("main".to_string(), main.display().to_string());
    inv.save(&paths::inventory_path(&etc)).unwrap();

    let payload = serde_json::json!([{
        "type": "config",
        "configs": {"telegraf": [
            {"id": "good", "config_file_id": "main", "contents": "W2FnZW50XQo="},
            {"id": "bad", "config_file_id": "missing", "contents": "W2FnZW50XQo="}
        ]}
    }]);

    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/collector/update")
        .with_status(200)
        .with_body(payload.to_string())
        .create_async()
        .await;
    let reported = server
        .mock("POST", "/collector/update")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "config_assignment_id": "good",
            "status": "active"
        })))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let exec = Arc::new(Recorder::default());
    let summary = engine(&etc, &server.url(), exec.clone())
        .run_cycle()
        .await
        .unwrap();

    assert_eq!(summary.configs, 1);
    assert_eq!(std::fs::read_to_string(&main).unwrap(), "[agent]\n");
    reported.assert_async().await;
}
