use crate::client::ApiClient;
use crate::error::Result;
use crate::executor::CommandOutput;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const WRITE_OK: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Active,
    Error,
}

// ---------------------------------------------------------------------------
// ConfigResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigResult {
    pub config_assignment_id: String,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    pub data: ConfigData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigData {
    /// `OK` or the write error.
    pub write_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload_result: Option<String>,
}

impl ConfigResult {
    pub fn written(id: &str) -> Self {
        Self {
            config_assignment_id: id.to_string(),
            status: ResultStatus::Active,
            info: None,
            data: ConfigData {
                write_result: WRITE_OK.to_string(),
                reload_result: None,
            },
        }
    }

    pub fn decode_failed(id: &str, err: impl ToString) -> Self {
        Self {
            config_assignment_id: id.to_string(),
            status: ResultStatus::Error,
            info: None,
            data: ConfigData {
                write_result: err.to_string(),
                reload_result: None,
            },
        }
    }

    pub fn write_failed(id: &str, err: impl ToString) -> Self {
        let msg = err.to_string();
        Self {
            config_assignment_id: id.to_string(),
            status: ResultStatus::Error,
            info: Some(msg.clone()),
            data: ConfigData {
                write_result: msg,
                reload_result: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub id: String,
    pub status: ResultStatus,
    pub data: CommandData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandData {
    /// Base64 encoded command output.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn from_output(id: &str, out: &CommandOutput) -> Self {
        Self {
            id: id.to_string(),
            status: if out.succeeded() {
                ResultStatus::Active
            } else {
                ResultStatus::Error
            },
            data: CommandData {
                output: B64.encode(&out.output),
                error: out.error.clone(),
                exit_code: out.exit_code,
            },
        }
    }

    pub fn ok(id: &str, output: &[u8]) -> Self {
        Self {
            id: id.to_string(),
            status: ResultStatus::Active,
            data: CommandData {
                output: B64.encode(output),
                error: None,
                exit_code: 0,
            },
        }
    }

    pub fn failed(id: &str, output: &[u8], exit_code: i32, err: impl ToString) -> Self {
        Self {
            id: id.to_string(),
            status: ResultStatus::Error,
            data: CommandData {
                output: B64.encode(output),
                error: Some(err.to_string()),
                exit_code,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// StatusResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResult {
    pub status: String,
    pub status_data: StatusData,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub substatus: String,
    pub error: String,
    /// Base64 encoded raw status output.
    pub raw_result: String,
    pub exit_code: i32,
}

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

const UPDATE_PATH: &str = "collector/update";

/// Posts per-item outcomes to the control plane. Nothing is retried
/// locally; the next poll re-derives any state that was lost.
#[derive(Debug, Clone)]
pub struct Reporter {
    client: ApiClient,
}

impl Reporter {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn config_result(&self, result: &ConfigResult) -> Result<()> {
        debug!(
            id = %result.config_assignment_id,
            status = ?result.status,
            "reporting config result"
        );
        self.post(result, &result.config_assignment_id).await
    }

    pub async fn command_result(&self, result: &CommandResult) -> Result<()> {
        debug!(id = %result.id, status = ?result.status, "reporting command result");
        self.post(result, &result.id).await
    }

    pub async fn status(&self, collector_id: &str, result: &StatusResult) -> Result<()> {
        self.client
            .put_json(&format!("collector/{collector_id}"), result)
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(collector_id, error = %e, "status report failed"))
    }

    async fn post<T: Serialize>(&self, result: &T, id: &str) -> Result<()> {
        self.client
            .post_json(UPDATE_PATH, result)
            .await
            .map(|_| ())
            .inspect_err(|e| warn!(id, error = %e, "result report failed"))
    }
}
