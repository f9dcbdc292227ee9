use crate::error::{AgentError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://agents-api.circonus.app/configurations/v1";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// HumanDuration
// ---------------------------------------------------------------------------

/// A duration written as `<n><unit>` in YAML, e.g. `60s`, `15m`, `250ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HumanDuration(pub Duration);

impl HumanDuration {
    pub const fn secs(s: u64) -> Self {
        Self(Duration::from_secs(s))
    }

    pub fn get(self) -> Duration {
        self.0
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis();
        if ms == 0 {
            write!(f, "0s")
        } else if ms % 3_600_000 == 0 {
            write!(f, "{}h", ms / 3_600_000)
        } else if ms % 60_000 == 0 {
            write!(f, "{}m", ms / 60_000)
        } else if ms % 1000 == 0 {
            write!(f, "{}s", ms / 1000)
        } else {
            write!(f, "{ms}ms")
        }
    }
}

impl std::str::FromStr for HumanDuration {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        parse_duration(s).map(Self)
    }
}

impl Serialize for HumanDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for HumanDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse `<n><unit>` where unit is one of `ms`, `s`, `m`, `h`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| AgentError::Config(format!("duration '{raw}' is missing a unit")))?;
    let (num, unit) = s.split_at(split);
    let n: u64 = num
        .parse()
        .map_err(|_| AgentError::Config(format!("invalid duration '{raw}'")))?;
    let d = match unit {
        "ms" => Duration::from_millis(n),
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        _ => {
            return Err(AgentError::Config(format!(
                "invalid duration unit '{unit}' in '{raw}' (expected ms, s, m or h)"
            )))
        }
    };
    Ok(d)
}

// ---------------------------------------------------------------------------
// ContainerMode
// ---------------------------------------------------------------------------

/// How config changes are signalled to collectors.
///
/// In container mode collectors run in sibling containers, so instead of
/// reloading them directly the agent queues a notification that the
/// container healthcheck picks up from `GET /config/<collector>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerMode {
    #[default]
    Auto,
    Always,
    Never,
}

impl ContainerMode {
    pub fn resolve(self) -> bool {
        match self {
            ContainerMode::Auto => crate::platform::in_container(),
            ContainerMode::Always => true,
            ContainerMode::Never => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ApiConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub url: String,
    #[serde(default = "default_api_timeout")]
    pub timeout: HumanDuration,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_api_timeout() -> HumanDuration {
    HumanDuration::secs(30)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_api_url(),
            timeout: default_api_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_server_address")]
    pub address: String,
    #[serde(default = "default_handler_timeout")]
    pub handler_timeout: HumanDuration,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: HumanDuration,
}

fn default_true() -> bool {
    true
}

fn default_server_address() -> String {
    "0.0.0.0:43285".to_string()
}

fn default_handler_timeout() -> HumanDuration {
    HumanDuration::secs(30)
}

fn default_shutdown_timeout() -> HumanDuration {
    HumanDuration::secs(30)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_server_address(),
            handler_timeout: default_handler_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

// ---------------------------------------------------------------------------
// LogConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AgentConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default = "default_action_poll")]
    pub action_poll_interval: HumanDuration,
    #[serde(default = "default_tracker_poll")]
    pub tracker_poll_interval: HumanDuration,
    /// `0s` disables the status poller.
    #[serde(default = "default_status_poll")]
    pub status_poll_interval: HumanDuration,
    #[serde(default = "default_command_timeout")]
    pub command_timeout: HumanDuration,
    #[serde(default = "default_reload_timeout")]
    pub reload_timeout: HumanDuration,
    #[serde(default)]
    pub container_mode: ContainerMode,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_action_poll() -> HumanDuration {
    HumanDuration::secs(60)
}

fn default_tracker_poll() -> HumanDuration {
    HumanDuration::secs(15 * 60)
}

fn default_status_poll() -> HumanDuration {
    HumanDuration::secs(5 * 60)
}

fn default_command_timeout() -> HumanDuration {
    HumanDuration::secs(30)
}

fn default_reload_timeout() -> HumanDuration {
    HumanDuration::secs(15)
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            action_poll_interval: default_action_poll(),
            tracker_poll_interval: default_tracker_poll(),
            status_poll_interval: default_status_poll(),
            command_timeout: default_command_timeout(),
            reload_timeout: default_reload_timeout(),
            container_mode: ContainerMode::default(),
            server: ServerConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: AgentConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::write_private(path, data.as_bytes())
    }

    pub fn status_poller_enabled(&self) -> bool {
        !self.status_poll_interval.get().is_zero()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut error = |message: String| {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message,
            })
        };

        if self.api.url.trim().is_empty() {
            error("api.url is empty".to_string());
        }

        for (key, value) in [
            ("action_poll_interval", self.action_poll_interval),
            ("tracker_poll_interval", self.tracker_poll_interval),
            ("command_timeout", self.command_timeout),
            ("reload_timeout", self.reload_timeout),
        ] {
            if value.get().is_zero() {
                error(format!("{key} must be greater than zero"));
            }
        }

        // A command still running when the next poll fires would overlap
        // with the next invocation of the same action.
        if self.command_timeout >= self.action_poll_interval {
            error(format!(
                "command_timeout ({}) must be shorter than action_poll_interval ({})",
                self.command_timeout, self.action_poll_interval
            ));
        }
        if self.reload_timeout >= self.action_poll_interval {
            error(format!(
                "reload_timeout ({}) must be shorter than action_poll_interval ({})",
                self.reload_timeout, self.action_poll_interval
            ));
        }

        if !self.api.url.starts_with("https://") && !self.api.url.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "api.url '{}' is not https; credentials will be sent in clear text",
                    self.api.url
                ),
            });
        }

        warnings
    }

    /// Validation errors joined into one message, or `Ok` when there are none.
    pub fn check(&self) -> Result<()> {
        let errors: Vec<String> = self
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Config(errors.join("; ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("2h").unwrap(), Duration::from_secs(7200));
        assert!(parse_duration("60").is_err());
        assert!(parse_duration("1d").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn human_duration_display() {
        assert_eq!(HumanDuration::secs(60).to_string(), "1m");
        assert_eq!(HumanDuration::secs(45).to_string(), "45s");
        assert_eq!(HumanDuration(Duration::from_millis(1500)).to_string(), "1500ms");
        assert_eq!(HumanDuration::secs(0).to_string(), "0s");
    }

    #[test]
    fn default_config_roundtrip() {
        let cfg = AgentConfig::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: AgentConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.action_poll_interval, HumanDuration::secs(60));
        assert_eq!(parsed.tracker_poll_interval, HumanDuration::secs(900));
        assert_eq!(parsed.api.url, DEFAULT_API_URL);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "action_poll_interval: 2m\nlog:\n  level: debug\n";
        let cfg: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.action_poll_interval, HumanDuration::secs(120));
        assert_eq!(cfg.command_timeout, HumanDuration::secs(30));
        assert_eq!(cfg.log.level, "debug");
        assert!(cfg.server.enabled);
        assert_eq!(cfg.container_mode, ContainerMode::Auto);
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = AgentConfig::default();
        assert!(cfg.check().is_ok());
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn command_timeout_must_be_shorter_than_poll() {
        let cfg = AgentConfig {
            command_timeout: HumanDuration::secs(60),
            ..AgentConfig::default()
        };
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| {
            w.level == WarnLevel::Error && w.message.contains("command_timeout (1m)")
        }));
        assert!(cfg.check().is_err());
    }

    #[test]
    fn plain_http_api_url_warns() {
        let mut cfg = AgentConfig::default();
        cfg.api.url = "http://localhost:8080".to_string();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Warning && w.message.contains("not https")));
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn status_poll_zero_disables_poller() {
        let yaml = "status_poll_interval: 0s\n";
        let cfg: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!cfg.status_poller_enabled());
    }

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = AgentConfig::load(&dir.path().join("cma.yaml")).unwrap();
        assert_eq!(cfg.server.address, "0.0.0.0:43285");
    }
}
