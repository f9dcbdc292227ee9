use crate::engine::Engine;
use crate::error::AgentError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Run `tick` every `interval` until `cancel` fires. A tick in progress
/// always completes before cancellation is observed.
async fn poll_loop<F, Fut>(
    name: &'static str,
    interval: Duration,
    cancel: CancellationToken,
    mut tick: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    info!(poller = name, interval = ?interval, "starting poller");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => tick().await,
        }
    }
    info!(poller = name, "poller stopped");
}

fn log_failure(poller: &'static str, e: &AgentError) {
    if e.is_retryable() {
        warn!(poller, error = %e, "cycle failed, retrying next interval");
    } else {
        error!(poller, error = %e, "cycle failed");
    }
}

// ---------------------------------------------------------------------------
// ActionPoller
// ---------------------------------------------------------------------------

pub struct ActionPoller {
    engine: Arc<Engine>,
    interval: Duration,
}

impl ActionPoller {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub async fn start(self, cancel: CancellationToken) {
        let engine = self.engine;
        poll_loop("actions", self.interval, cancel, || {
            let engine = engine.clone();
            async move {
                debug!("checking for new actions");
                match engine.run_cycle().await {
                    Ok(s) if s.configs + s.commands > 0 => {
                        info!(configs = s.configs, commands = s.commands, "actions processed")
                    }
                    Ok(_) => {}
                    Err(e) => log_failure("actions", &e),
                }
            }
        })
        .await;
    }
}

// ---------------------------------------------------------------------------
// DriftPoller
// ---------------------------------------------------------------------------

pub struct DriftPoller {
    engine: Arc<Engine>,
    interval: Duration,
}

impl DriftPoller {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub async fn start(self, cancel: CancellationToken) {
        let engine = self.engine;
        poll_loop("drift", self.interval, cancel, || {
            let engine = engine.clone();
            async move {
                debug!("tracking installed configs");
                if let Err(e) = engine.check_drift().await {
                    log_failure("drift", &e);
                }
            }
        })
        .await;
    }
}

// ---------------------------------------------------------------------------
// StatusPoller
// ---------------------------------------------------------------------------

pub struct StatusPoller {
    engine: Arc<Engine>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub async fn start(self, cancel: CancellationToken) {
        let engine = self.engine;
        poll_loop("status", self.interval, cancel, || {
            let engine = engine.clone();
            async move {
                debug!("collecting collector status");
                match engine.report_status().await {
                    Ok(n) => debug!(reported = n, "status reported"),
                    Err(e) => log_failure("status", &e),
                }
            }
        })
        .await;
    }
}
