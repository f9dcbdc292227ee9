#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cma(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cma").unwrap();
    cmd.current_dir(dir.path())
        .env("CMA_ETC_DIR", dir.path())
        .env_remove("CMA_API_URL")
        .env_remove("RUST_LOG");
    cmd
}

const INVENTORY: &str = r#"
linux:
  telegraf:
    binary: /opt/telegraf/bin/telegraf
    restart: systemctl restart telegraf
    reload: restart
    status: systemctl status telegraf
    config_files:
      main: /etc/telegraf/telegraf.conf
  fluent-bit:
    binary: /opt/fluent-bit/bin/fluent-bit
    reload: http|post||http://127.0.0.1:2020/api/v2/reload
darwin:
  telegraf:
    reload: brew|telegraf
"#;

// ---------------------------------------------------------------------------
// cma config
// ---------------------------------------------------------------------------

#[test]
fn config_show_prints_defaults() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("action_poll_interval: 1m"))
        .stdout(predicate::str::contains("43285"));
}

#[test]
fn config_show_applies_api_url_flag() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .args(["--api-url", "https://api.test/v1", "--json", "config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://api.test/v1"));
}

#[test]
fn config_validate_accepts_defaults() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_rejects_slow_commands() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("cma.yaml"),
        "action_poll_interval: 30s\ncommand_timeout: 45s\n",
    )
    .unwrap();
    cma(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] command_timeout"))
        .stderr(predicate::str::contains("error: config validation found errors"));
}

#[test]
fn unparsable_config_fails_every_command() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cma.yaml"), "command_timeout: later\n").unwrap();
    cma(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cma.yaml"));
}

// ---------------------------------------------------------------------------
// cma inventory
// ---------------------------------------------------------------------------

#[test]
fn inventory_list_shows_platform_collectors() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("inventory.yaml"), INVENTORY).unwrap();
    std::fs::write(
        dir.path().join("agents.yaml"),
        "- collector_id: col-7\n  collector_type_id: telegraf\n",
    )
    .unwrap();

    cma(&dir)
        .args(["inventory", "list", "--platform", "linux"])
        .assert()
        .success()
        .stdout(predicate::str::contains("telegraf"))
        .stdout(predicate::str::contains("col-7"))
        .stdout(predicate::str::contains("fluent-bit"));
}

#[test]
fn inventory_list_json() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("inventory.yaml"), INVENTORY).unwrap();

    let out = cma(&dir)
        .args(["--json", "inventory", "list", "--platform", "darwin"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let items: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(items[0]["name"], "telegraf");
    assert_eq!(items[0]["reload"], "brew|telegraf");
    assert!(items[0]["collector_id"].is_null());
}

#[test]
fn inventory_list_without_inventory_fails() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .args(["inventory", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load inventory"));
}

// ---------------------------------------------------------------------------
// cma run / drift
// ---------------------------------------------------------------------------

#[test]
fn run_without_credentials_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent is not registered"));
}

#[test]
fn default_command_is_run() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent is not registered"));
}

#[test]
fn drift_check_requires_credentials() {
    let dir = TempDir::new().unwrap();
    cma(&dir)
        .args(["drift", "check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("agent is not registered"));
}
