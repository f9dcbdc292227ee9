use crate::actions::{Config, ConfigBatch};
use crate::error::Result;
use crate::inventory::Collectors;
use crate::notify::PendingNotifications;
use crate::reload::{ReloadOutcome, Reloader};
use crate::results::{ConfigResult, Reporter};
use crate::tracker::Tracker;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How collectors learn about newly written configs.
#[derive(Debug, Clone)]
pub enum ReloadMode {
    /// Run the collector's reload descriptor directly.
    Direct,
    /// Queue a notification for the collector's container healthcheck.
    Container(PendingNotifications),
}

/// Writes config files, records drift baselines and reloads each collector
/// once per batch.
pub struct Installer {
    reporter: Reporter,
    tracker: Tracker,
    reloader: Arc<Reloader>,
    mode: ReloadMode,
}

impl Installer {
    pub fn new(
        reporter: Reporter,
        tracker: Tracker,
        reloader: Arc<Reloader>,
        mode: ReloadMode,
    ) -> Self {
        Self {
            reporter,
            tracker,
            reloader,
            mode,
        }
    }

    /// Install every config in `batch`, returning the results that were
    /// reported (one per config).
    pub async fn install(&self, batch: &ConfigBatch, collectors: &Collectors) -> Vec<ConfigResult> {
        let mut results = Vec::new();

        for (name, configs) in batch {
            let mut written = 0usize;

            for config in configs {
                let result = match B64.decode(config.contents.trim()) {
                    Err(e) => {
                        warn!(
                            collector = %name,
                            id = %config.id,
                            error = %e,
                            "invalid config contents"
                        );
                        ConfigResult::decode_failed(&config.id, e)
                    }
                    Ok(data) => match self.write_config(name, config, &data) {
                        Err(e) => {
                            error!(
                                collector = %name,
                                id = %config.id,
                                path = %config.path.display(),
                                error = %e,
                                "writing config"
                            );
                            ConfigResult::write_failed(&config.id, e)
                        }
                        Ok(()) => {
                            info!(
                                collector = %name,
                                id = %config.id,
                                path = %config.path.display(),
                                bytes = data.len(),
                                "config installed"
                            );
                            written += 1;
                            let tracked =
                                self.tracker
                                    .update_config(name, &config.id, &config.path, &data);
                            if let Err(e) = tracked {
                                error!(
                                    collector = %name,
                                    id = %config.id,
                                    error = %e,
                                    "updating config tracking data"
                                );
                            }
                            ConfigResult::written(&config.id)
                        }
                    },
                };

                // Reporting failures never stop the batch.
                let _ = self.reporter.config_result(&result).await;
                results.push(result);
            }

            if written > 0 {
                self.signal(name, collectors).await;
            }
        }
        results
    }

    /// Back up a file the agent has never managed, then replace it.
    fn write_config(&self, name: &str, config: &Config, data: &[u8]) -> Result<()> {
        if let Some(backup) = self.tracker.backup_original(name, &config.path)? {
            info!(
                collector = name,
                path = %config.path.display(),
                backup = %backup.display(),
                "original config backed up"
            );
        }
        crate::io::write_preserving(&config.path, data)
    }

    async fn signal(&self, name: &str, collectors: &Collectors) {
        match &self.mode {
            ReloadMode::Container(pending) => {
                debug!(collector = name, "queueing container notification");
                pending.mark(name);
            }
            ReloadMode::Direct => {
                let Some(collector) = collectors.get(name) else {
                    warn!(collector = name, "no collector definition for reload, skipping");
                    return;
                };
                match self.reloader.reload(name, collector).await {
                    Ok(ReloadOutcome::Command(out)) if !out.succeeded() => warn!(
                        collector = name,
                        exit_code = out.exit_code,
                        error = ?out.error,
                        output = %out.output_lossy(),
                        "reload command failed"
                    ),
                    Ok(outcome) => info!(collector = name, outcome = ?outcome, "collector reloaded"),
                    Err(e) => warn!(collector = name, error = %e, "reload failed"),
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
