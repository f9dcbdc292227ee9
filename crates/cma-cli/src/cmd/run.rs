use crate::cmd;
use crate::settings::Settings;
use anyhow::Context;
use cma_core::notify::PendingNotifications;
use cma_core::poller::{ActionPoller, DriftPoller, StatusPoller};
use cma_server::AppState;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub fn run(settings: &Settings) -> anyhow::Result<()> {
    cmd::runtime()?.block_on(run_agent(settings))
}

async fn run_agent(settings: &Settings) -> anyhow::Result<()> {
    let cfg = &settings.config;
    cfg.check()?;

    let client = cmd::client(settings)?;
    let notifications = PendingNotifications::new();
    let engine = Arc::new(cmd::engine(settings, client.clone(), &notifications)?);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = %engine.platform(),
        etc = %settings.etc.display(),
        api = %client.base_url(),
        container = cfg.container_mode.resolve(),
        "starting agent"
    );

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();

    tasks.spawn(
        ActionPoller::new(engine.clone(), cfg.action_poll_interval.get()).start(cancel.clone()),
    );
    tasks.spawn(
        DriftPoller::new(engine.clone(), cfg.tracker_poll_interval.get()).start(cancel.clone()),
    );
    if cfg.status_poller_enabled() {
        tasks.spawn(
            StatusPoller::new(engine.clone(), cfg.status_poll_interval.get())
                .start(cancel.clone()),
        );
    } else {
        info!("status poller disabled");
    }

    if cfg.server.enabled {
        let listener = tokio::net::TcpListener::bind(&cfg.server.address)
            .await
            .with_context(|| format!("failed to bind {}", cfg.server.address))?;
        let state = AppState::new(client, notifications)
            .with_handler_timeout(cfg.server.handler_timeout.get());
        let drain = cfg.server.shutdown_timeout.get();
        let server_cancel = cancel.clone();
        tasks.spawn(async move {
            if let Err(e) = cma_server::serve(listener, state, server_cancel.clone(), drain).await {
                error!(error = %e, "http server failed");
                // without the server, container-mode collectors never see reload signals
                server_cancel.cancel();
            }
        });
    }

    tokio::select! {
        _ = shutdown_signal() => info!("shutdown signal received"),
        _ = cancel.cancelled() => warn!("component failed, shutting down"),
    }
    cancel.cancel();

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!(error = %e, "task ended abnormally");
        }
    }
    info!("agent stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
