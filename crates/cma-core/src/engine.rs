use crate::actions::{translate, Action, Command, CommandVerb};
use crate::client::ApiClient;
use crate::config::AgentConfig;
use crate::credentials::Credentials;
use crate::error::{AgentError, Result};
use crate::executor::{CommandExecutor, ShellExecutor, NO_EXIT_CODE};
use crate::installer::{Installer, ReloadMode};
use crate::inventory::{Collectors, InstalledCollectors, Inventory};
use crate::notify::PendingNotifications;
use crate::paths;
use crate::platform::{ops_for, Platform, PlatformOps};
use crate::registration::Registration;
use crate::reload::Reloader;
use crate::results::{CommandResult, Reporter};
use crate::status::{probe_installed, CollectorStatus};
use crate::tracker::{Tracker, VerifyOutcome};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const ACTIONS_PATH: &str = "collector/update";

pub struct EngineOptions {
    pub etc: PathBuf,
    pub platform: Platform,
    pub reload_mode: ReloadMode,
    pub executor: Arc<dyn CommandExecutor>,
    pub ops: Arc<dyn PlatformOps>,
    pub reload_timeout: Duration,
}

impl EngineOptions {
    pub fn from_config(
        etc: &Path,
        cfg: &AgentConfig,
        notifications: &PendingNotifications,
    ) -> Self {
        let platform = Platform::current();
        let reload_mode = if cfg.container_mode.resolve() {
            ReloadMode::Container(notifications.clone())
        } else {
            ReloadMode::Direct
        };
        Self {
            etc: etc.to_path_buf(),
            ops: ops_for(&platform),
            platform,
            reload_mode,
            executor: Arc::new(ShellExecutor::new(cfg.command_timeout.get())),
            reload_timeout: cfg.reload_timeout.get(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub configs: usize,
    pub commands: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftEntry {
    pub collector: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<VerifyOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One agent's convergence engine: action cycles, drift checks and status
/// reports against a single control plane.
pub struct Engine {
    etc: PathBuf,
    platform: Platform,
    client: ApiClient,
    registration: Registration,
    reporter: Reporter,
    tracker: Tracker,
    reloader: Arc<Reloader>,
    installer: Installer,
}

impl Engine {
    pub fn new(client: ApiClient, opts: EngineOptions) -> Result<Self> {
        let registration = Registration::new(client.clone(), Credentials::new(&opts.etc));
        let reporter = Reporter::new(client.clone());

        let mut tracker = Tracker::new(&opts.etc, client.clone(), registration.clone());
        if let ReloadMode::Container(pending) = &opts.reload_mode {
            tracker = tracker.with_notifications(pending.clone());
        }

        let reloader = Arc::new(Reloader::new(opts.executor, opts.ops, opts.reload_timeout)?);
        let installer = Installer::new(
            reporter.clone(),
            tracker.clone(),
            reloader.clone(),
            opts.reload_mode,
        );

        Ok(Self {
            etc: opts.etc,
            platform: opts.platform,
            client,
            registration,
            reporter,
            tracker,
            reloader,
            installer,
        })
    }

    pub fn etc(&self) -> &Path {
        &self.etc
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    fn executor(&self) -> &dyn CommandExecutor {
        self.reloader.executor().as_ref()
    }

    fn collectors(&self) -> Result<Collectors> {
        let inventory = Inventory::load(&paths::inventory_path(&self.etc))?;
        Ok(inventory.for_platform(&self.platform))
    }

    /// Refresh credentials after a 401 and hand the 401 back to the caller;
    /// the work is retried on the next cycle.
    async fn unauthorized(&self) -> AgentError {
        if let Err(e) = self.registration.refresh().await {
            warn!(error = %e, "token refresh failed");
            return e;
        }
        AgentError::Unauthorized
    }

    // -----------------------------------------------------------------------
    // Action cycle
    // -----------------------------------------------------------------------

    /// Fetch pending actions, install configs and run commands.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let collectors = self.collectors()?;

        let body = match self.client.get(ACTIONS_PATH).await {
            Err(AgentError::Unauthorized) => return Err(self.unauthorized().await),
            other => other?,
        };
        if body.iter().all(u8::is_ascii_whitespace) {
            debug!("no actions available");
            return Ok(CycleSummary::default());
        }

        let actions = match translate(&body, &collectors) {
            Err(AgentError::NothingToDo) => {
                debug!("no actions available");
                return Ok(CycleSummary::default());
            }
            other => other?,
        };

        let mut summary = CycleSummary::default();
        for action in actions {
            match action {
                Action::Config(batch) => {
                    summary.configs += self.installer.install(&batch, &collectors).await.len();
                }
                Action::Command(commands) => {
                    for cmd in commands {
                        let result = self.dispatch(&cmd, &collectors).await;
                        info!(
                            id = %cmd.id,
                            collector = %cmd.collector,
                            command = %cmd.verb,
                            status = ?result.status,
                            "command finished"
                        );
                        let _ = self.reporter.command_result(&result).await;
                        summary.commands += 1;
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Run one command and build its result.
    pub async fn dispatch(&self, cmd: &Command, collectors: &Collectors) -> CommandResult {
        if cmd.verb == CommandVerb::Inventory {
            return self.inventory_result(&cmd.id);
        }

        let Some(collector) = collectors.get(&cmd.collector) else {
            let e = AgentError::UnknownTarget(format!("collector '{}'", cmd.collector));
            return CommandResult::failed(&cmd.id, b"", NO_EXIT_CODE, e);
        };

        let line = match cmd.verb {
            CommandVerb::Reload => {
                return match self.reloader.reload(&cmd.collector, collector).await {
                    Ok(outcome) => outcome.to_command_result(&cmd.id),
                    Err(AgentError::Http { status, body }) => CommandResult::failed(
                        &cmd.id,
                        body.as_bytes(),
                        0,
                        format!("http reload failed with status {status}"),
                    ),
                    Err(e) => CommandResult::failed(&cmd.id, b"", NO_EXIT_CODE, e),
                };
            }
            CommandVerb::Start => &collector.start,
            CommandVerb::Stop => &collector.stop,
            CommandVerb::Restart => &collector.restart,
            CommandVerb::Status => &collector.status,
            CommandVerb::Version => &collector.version,
            CommandVerb::Inventory => return self.inventory_result(&cmd.id),
        };

        if line.trim().is_empty() {
            let e = AgentError::Execution(format!(
                "collector '{}' has no {} command",
                cmd.collector, cmd.verb
            ));
            return CommandResult::failed(&cmd.id, b"", NO_EXIT_CODE, e);
        }
        CommandResult::from_output(&cmd.id, &self.executor().execute(line).await)
    }

    /// Re-read the inventory from disk and report what it defines.
    fn inventory_result(&self, id: &str) -> CommandResult {
        match self.collectors() {
            Ok(c) => CommandResult::ok(
                id,
                format!("{} collectors defined for {}", c.len(), self.platform).as_bytes(),
            ),
            Err(e) => CommandResult::failed(id, b"", NO_EXIT_CODE, e),
        }
    }

    // -----------------------------------------------------------------------
    // Drift
    // -----------------------------------------------------------------------

    /// Verify every tracked file of every installed collector once.
    pub async fn check_drift(&self) -> Result<Vec<DriftEntry>> {
        let installed = InstalledCollectors::load(&paths::installed_path(&self.etc))?;
        let collectors = self.collectors()?;

        let mut entries = Vec::new();
        for c in installed.iter() {
            let known: Vec<PathBuf> = collectors
                .get(&c.collector_type_id)
                .map(|def| def.config_files.values().map(PathBuf::from).collect())
                .unwrap_or_default();

            for (path, res) in self.tracker.verify_collector(&c.collector_type_id, known).await {
                let (outcome, error) = match res {
                    Ok(o) => (Some(o), None),
                    Err(e) => (None, Some(e.to_string())),
                };
                entries.push(DriftEntry {
                    collector: c.collector_type_id.clone(),
                    path,
                    outcome,
                    error,
                });
            }
        }
        Ok(entries)
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Probe installed collectors without reporting.
    pub async fn probe_status(&self) -> Result<Vec<CollectorStatus>> {
        let installed = InstalledCollectors::load(&paths::installed_path(&self.etc))?;
        let collectors = self.collectors()?;
        let ops = self.reloader.ops().as_ref();
        Ok(probe_installed(self.executor(), ops, &installed, &collectors).await)
    }

    /// Probe installed collectors and report each status.
    pub async fn report_status(&self) -> Result<usize> {
        let statuses = self.probe_status().await?;
        let mut sent = 0;
        for s in &statuses {
            match self.reporter.status(&s.collector_id, &s.result).await {
                Ok(()) => sent += 1,
                Err(AgentError::Unauthorized) => return Err(self.unauthorized().await),
                Err(_) => {}
            }
        }
        Ok(sent)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
