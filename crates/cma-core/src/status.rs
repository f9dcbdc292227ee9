use crate::executor::{CommandExecutor, NO_EXIT_CODE};
use crate::inventory::{Collectors, InstalledCollectors};
use crate::platform::PlatformOps;
use crate::results::{StatusData, StatusResult};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const UNKNOWN: &str = "unknown";

/// `ActiveState` and `SubState` from `systemctl show` output.
pub fn parse_systemctl_show(output: &str) -> (Option<String>, Option<String>) {
    let mut active = None;
    let mut sub = None;
    for line in output.lines() {
        if let Some(v) = line.strip_prefix("ActiveState=") {
            active = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("SubState=") {
            sub = Some(v.trim().to_string());
        }
    }
    (active, sub)
}

pub fn unknown(error: String, raw: &[u8], exit_code: i32) -> StatusResult {
    StatusResult {
        status: UNKNOWN.to_string(),
        status_data: StatusData {
            substatus: String::new(),
            error,
            raw_result: B64.encode(raw),
            exit_code,
        },
    }
}

/// Run a collector's status command and interpret it.
///
/// `systemctl status X` is answered from `systemctl show X` plus the raw
/// status output; `brew services info X` from its `--json` form. Anything
/// else is `unknown`.
pub async fn probe(executor: &dyn CommandExecutor, cmd: &str) -> StatusResult {
    let cmd = cmd.trim();
    if cmd.starts_with("systemctl") {
        systemctl_status(executor, cmd).await
    } else if cmd.starts_with("brew") {
        brew_status(executor, cmd).await
    } else {
        unknown(format!("unable to obtain status from '{cmd}'"), b"", NO_EXIT_CODE)
    }
}

async fn systemctl_status(executor: &dyn CommandExecutor, cmd: &str) -> StatusResult {
    let show = cmd.replacen("status", "show", 1);
    let out = executor.execute(&show).await;
    if !out.succeeded() {
        let err = out
            .error
            .clone()
            .unwrap_or_else(|| format!("{show}: exit code {}", out.exit_code));
        return unknown(err, &out.output, out.exit_code);
    }

    let (active, sub) = parse_systemctl_show(&out.output_lossy());

    // systemctl status exits non-zero for inactive units; that is still a
    // valid answer, the raw output is what matters here.
    let raw = executor.execute(cmd).await;
    StatusResult {
        status: active.unwrap_or_else(|| UNKNOWN.to_string()),
        status_data: StatusData {
            substatus: sub.unwrap_or_default(),
            error: raw.error.clone().unwrap_or_default(),
            raw_result: B64.encode(&raw.output),
            exit_code: raw.exit_code,
        },
    }
}

/// One entry of `brew services info --json`.
#[derive(Debug, Deserialize)]
struct BrewService {
    #[serde(default)]
    running: bool,
}

async fn brew_status(executor: &dyn CommandExecutor, cmd: &str) -> StatusResult {
    let cmd = if cmd.ends_with("--json") {
        cmd.to_string()
    } else {
        format!("{cmd} --json")
    };
    let out = executor.execute(&cmd).await;
    if !out.succeeded() {
        let err = out
            .error
            .clone()
            .unwrap_or_else(|| format!("{cmd}: exit code {}", out.exit_code));
        return unknown(err, &out.output, out.exit_code);
    }

    let services: Vec<BrewService> = match serde_json::from_slice(&out.output) {
        Ok(s) => s,
        Err(e) => {
            return unknown(
                format!("{cmd}: unreadable service info: {e}"),
                &out.output,
                out.exit_code,
            )
        }
    };
    let running = services.iter().any(|s| s.running);
    StatusResult {
        status: if running { "running" } else { "stopped" }.to_string(),
        status_data: StatusData {
            substatus: String::new(),
            error: String::new(),
            raw_result: B64.encode(&out.output),
            exit_code: out.exit_code,
        },
    }
}

/// Status of one installed collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub collector: String,
    pub collector_id: String,
    pub result: StatusResult,
}

/// Probe every installed collector that has a status command.
pub async fn probe_installed(
    executor: &dyn CommandExecutor,
    ops: &dyn PlatformOps,
    installed: &InstalledCollectors,
    collectors: &Collectors,
) -> Vec<CollectorStatus> {
    let mut out = Vec::new();
    for c in installed.iter() {
        let Some(def) = collectors.get(&c.collector_type_id) else {
            warn!(collector = %c.collector_type_id, "installed collector missing from inventory");
            continue;
        };
        if def.status.trim().is_empty() {
            continue;
        }
        let result = ops.status(executor, &def.status).await;
        if !result.status_data.error.is_empty() {
            warn!(
                collector = %c.collector_type_id,
                collector_id = %c.collector_id,
                status = %result.status,
                error = %result.status_data.error,
                "status command failed"
            );
        }
        out.push(CollectorStatus {
            collector: c.collector_type_id.clone(),
            collector_id: c.collector_id.clone(),
            result,
        });
    }
    out
}
