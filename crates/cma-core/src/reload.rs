use crate::error::{AgentError, Result};
use crate::executor::{CommandExecutor, CommandOutput};
use crate::inventory::{Collector, HttpMethod, ReloadDescriptor};
use crate::platform::PlatformOps;
use crate::results::CommandResult;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What a reload attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The collector reloads itself.
    Noop,
    /// Nothing was run; the reason is logged.
    Skipped(String),
    Command(CommandOutput),
    Http { status: u16, body: Vec<u8> },
}

impl ReloadOutcome {
    /// Command result for an explicit `reload` command.
    pub fn to_command_result(&self, id: &str) -> CommandResult {
        match self {
            ReloadOutcome::Noop => CommandResult::ok(id, b""),
            ReloadOutcome::Skipped(reason) => CommandResult::ok(id, reason.as_bytes()),
            ReloadOutcome::Command(out) => CommandResult::from_output(id, out),
            // exit code does not apply to http reloads
            ReloadOutcome::Http { body, .. } => CommandResult::ok(id, body),
        }
    }
}

/// Dispatches a collector's reload descriptor to one strategy.
///
/// Reloads of the same collector are serialized; different collectors may
/// reload concurrently.
pub struct Reloader {
    executor: Arc<dyn CommandExecutor>,
    ops: Arc<dyn PlatformOps>,
    http: reqwest::Client,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Reloader {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        ops: Arc<dyn PlatformOps>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            executor,
            ops,
            http,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn executor(&self) -> &Arc<dyn CommandExecutor> {
        &self.executor
    }

    pub fn ops(&self) -> &Arc<dyn PlatformOps> {
        &self.ops
    }

    fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(name.to_string()).or_default().clone()
    }

    pub async fn reload(&self, name: &str, collector: &Collector) -> Result<ReloadOutcome> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        debug!(collector = name, reload = %collector.reload, "reloading collector");

        match &collector.reload {
            ReloadDescriptor::None => Ok(ReloadOutcome::Noop),
            ReloadDescriptor::Restart => {
                if collector.restart.trim().is_empty() {
                    return Err(AgentError::Execution(format!(
                        "collector '{name}' has no restart command"
                    )));
                }
                Ok(ReloadOutcome::Command(
                    self.executor.execute(&collector.restart).await,
                ))
            }
            ReloadDescriptor::Http { method, body, url } => {
                self.http_reload(*method, body, url).await
            }
            ReloadDescriptor::SystemdUnit { name: unit } => {
                self.ops
                    .restart_systemd_unit(self.executor.as_ref(), unit)
                    .await
            }
            ReloadDescriptor::BrewFormula { formula } => {
                self.ops
                    .restart_brew_formula(self.executor.as_ref(), formula)
                    .await
            }
            ReloadDescriptor::RawCommand { cmd } => {
                Ok(ReloadOutcome::Command(self.executor.execute(cmd).await))
            }
            ReloadDescriptor::Invalid { raw, reason } => {
                warn!(collector = name, reload = %raw, %reason, "invalid reload setting");
                Err(AgentError::InvalidDescriptor {
                    raw: raw.clone(),
                    reason: reason.clone(),
                })
            }
        }
    }

    async fn http_reload(
        &self,
        method: HttpMethod,
        body: &str,
        url: &str,
    ) -> Result<ReloadOutcome> {
        let req = match method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url).body(body.to_string()),
            HttpMethod::Put => self.http.put(url).body(body.to_string()),
        };

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?.to_vec();

        if !status.is_success() {
            return Err(AgentError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        info!(url, status = status.as_u16(), "http reload");
        Ok(ReloadOutcome::Http {
            status: status.as_u16(),
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
