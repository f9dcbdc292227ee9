use crate::error::Result;
use crate::executor::CommandExecutor;
use crate::reload::ReloadOutcome;
use crate::results::StatusResult;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Platform / Arch
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Darwin,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => Platform::Linux,
            "macos" | "darwin" => Platform::Darwin,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Key used for this platform in the inventory file.
    pub fn key(&self) -> &str {
        match self {
            Platform::Linux => "linux",
            Platform::Darwin => "darwin",
            Platform::Other(os) => os,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Other(String),
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => Arch::Other(other.to_string()),
        }
    }
}

/// Best-effort detection of running inside a docker/podman/lxc container.
pub fn in_container() -> bool {
    if std::path::Path::new("/.dockerenv").exists()
        || std::path::Path::new("/run/.containerenv").exists()
    {
        return true;
    }
    if std::env::var("container").is_ok_and(|v| v == "podman") {
        return true;
    }
    ["/proc/1/cgroup", "/proc/self/mountinfo"].iter().any(|f| {
        std::fs::read_to_string(f)
            .map(|data| data.contains("/docker") || data.contains("/lxc"))
            .unwrap_or(false)
    })
}

// ---------------------------------------------------------------------------
// PlatformOps
// ---------------------------------------------------------------------------

/// Service-manager operations that only exist on some platforms.
///
/// Descriptors targeting a service manager the host does not have are
/// skipped with a warning rather than treated as errors.
#[async_trait]
pub trait PlatformOps: Send + Sync {
    fn name(&self) -> &str;

    async fn restart_systemd_unit(
        &self,
        executor: &dyn CommandExecutor,
        unit: &str,
    ) -> Result<ReloadOutcome>;

    async fn restart_brew_formula(
        &self,
        executor: &dyn CommandExecutor,
        formula: &str,
    ) -> Result<ReloadOutcome>;

    /// Interpret a collector's status command.
    async fn status(&self, executor: &dyn CommandExecutor, cmd: &str) -> StatusResult {
        crate::status::probe(executor, cmd).await
    }
}

pub fn ops_for(platform: &Platform) -> Arc<dyn PlatformOps> {
    match platform {
        Platform::Linux => Arc::new(LinuxOps),
        Platform::Darwin => Arc::new(DarwinOps::for_arch(&Arch::current())),
        Platform::Other(os) => Arc::new(UnsupportedOps {
            platform: os.clone(),
        }),
    }
}

fn unsupported(manager: &str, platform: &str, target: &str) -> ReloadOutcome {
    warn!(manager, platform, target, "service manager not available, skipping reload");
    ReloadOutcome::Skipped(format!("{manager} is not available on {platform}"))
}

// ---------------------------------------------------------------------------
// Linux
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxOps;

#[async_trait]
impl PlatformOps for LinuxOps {
    fn name(&self) -> &str {
        "linux"
    }

    async fn restart_systemd_unit(
        &self,
        executor: &dyn CommandExecutor,
        unit: &str,
    ) -> Result<ReloadOutcome> {
        let check = executor
            .execute(&format!("systemctl is-enabled {unit}.service"))
            .await;
        if !check.succeeded() {
            info!(
                unit,
                exit_code = check.exit_code,
                output = %check.output_lossy().trim(),
                "unit not enabled, skipping restart"
            );
            return Ok(ReloadOutcome::Skipped(format!("{unit}.service is not enabled")));
        }

        let out = executor
            .execute(&format!("systemctl restart {unit}.service"))
            .await;
        Ok(ReloadOutcome::Command(out))
    }

    async fn restart_brew_formula(
        &self,
        _executor: &dyn CommandExecutor,
        formula: &str,
    ) -> Result<ReloadOutcome> {
        Ok(unsupported("brew", self.name(), formula))
    }
}

// ---------------------------------------------------------------------------
// Darwin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DarwinOps {
    brew: Option<PathBuf>,
}

impl DarwinOps {
    pub fn for_arch(arch: &Arch) -> Self {
        let brew = match arch {
            Arch::Aarch64 => Some(PathBuf::from("/opt/homebrew/bin/brew")),
            Arch::X86_64 => Some(PathBuf::from("/usr/local/bin/brew")),
            Arch::Other(a) => {
                warn!(arch = %a, "unsupported architecture for brew");
                None
            }
        };
        Self { brew }
    }

    pub fn with_brew(path: impl Into<PathBuf>) -> Self {
        Self {
            brew: Some(path.into()),
        }
    }

    pub fn brew_path(&self) -> Option<&std::path::Path> {
        self.brew.as_deref()
    }
}

#[async_trait]
impl PlatformOps for DarwinOps {
    fn name(&self) -> &str {
        "darwin"
    }

    async fn restart_systemd_unit(
        &self,
        _executor: &dyn CommandExecutor,
        unit: &str,
    ) -> Result<ReloadOutcome> {
        Ok(unsupported("systemd", self.name(), unit))
    }

    async fn restart_brew_formula(
        &self,
        executor: &dyn CommandExecutor,
        formula: &str,
    ) -> Result<ReloadOutcome> {
        let brew = match self.brew.as_deref() {
            Some(p) if p.exists() => p,
            other => {
                warn!(
                    brew = ?other,
                    formula,
                    "brew not found, cannot reload collector"
                );
                return Ok(ReloadOutcome::Skipped("brew not found".to_string()));
            }
        };

        let out = executor
            .execute(&format!("{} services restart {formula}", brew.display()))
            .await;
        Ok(ReloadOutcome::Command(out))
    }
}

// ---------------------------------------------------------------------------
// Everything else
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct UnsupportedOps {
    pub platform: String,
}

#[async_trait]
impl PlatformOps for UnsupportedOps {
    fn name(&self) -> &str {
        &self.platform
    }

    async fn restart_systemd_unit(
        &self,
        _executor: &dyn CommandExecutor,
        unit: &str,
    ) -> Result<ReloadOutcome> {
        Ok(unsupported("systemd", &self.platform, unit))
    }

    async fn restart_brew_formula(
        &self,
        _executor: &dyn CommandExecutor,
        formula: &str,
    ) -> Result<ReloadOutcome> {
        Ok(unsupported("brew", &self.platform, formula))
    }

    async fn status(&self, _executor: &dyn CommandExecutor, cmd: &str) -> StatusResult {
        crate::status::unknown(
            format!("no status support on {} for '{cmd}'", self.platform),
            b"",
            crate::executor::NO_EXIT_CODE,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
