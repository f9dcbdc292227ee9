pub mod config;
pub mod drift;
pub mod inventory;
pub mod run;
pub mod status;

use crate::settings::Settings;
use anyhow::Context;
use cma_core::client::ApiClient;
use cma_core::credentials::Credentials;
use cma_core::engine::{Engine, EngineOptions};
use cma_core::notify::PendingNotifications;

/// Control-plane client using the stored access token.
///
/// A missing token is fatal: the agent must be registered before it can
/// talk to the control plane.
pub(crate) fn client(settings: &Settings) -> anyhow::Result<ApiClient> {
    let jwt = Credentials::new(&settings.etc)
        .load_jwt()
        .context("agent is not registered")?;
    let api = &settings.config.api;
    Ok(ApiClient::new(&api.url, api.timeout.get(), jwt)?)
}

pub(crate) fn engine(
    settings: &Settings,
    client: ApiClient,
    notifications: &PendingNotifications,
) -> anyhow::Result<Engine> {
    let opts = EngineOptions::from_config(&settings.etc, &settings.config, notifications);
    Ok(Engine::new(client, opts)?)
}

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
