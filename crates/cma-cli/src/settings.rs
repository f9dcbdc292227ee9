use anyhow::Context;
use cma_core::config::AgentConfig;
use cma_core::paths;
use std::path::PathBuf;

/// Resolved locations plus the effective config after CLI overrides.
#[derive(Debug, Clone)]
pub struct Settings {
    pub etc: PathBuf,
    pub config_path: PathBuf,
    pub config: AgentConfig,
}

impl Settings {
    pub fn resolve(
        etc_dir: Option<PathBuf>,
        config_path: Option<PathBuf>,
        api_url: Option<String>,
        log_level: Option<String>,
    ) -> anyhow::Result<Self> {
        let etc = etc_dir.unwrap_or_else(paths::default_etc_dir);
        let config_path = config_path.unwrap_or_else(|| paths::config_path(&etc));

        let mut config = AgentConfig::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        if let Some(url) = api_url {
            config.api.url = url;
        }
        if let Some(level) = log_level {
            config.log.level = level;
        }

        Ok(Self {
            etc,
            config_path,
            config,
        })
    }
}
