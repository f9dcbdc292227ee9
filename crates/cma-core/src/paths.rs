use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------
//
// Expected installation structure:
//
//   <base>                 e.g. /opt/cma
//     /etc                 configuration, inventory, tracking state
//       /.id               credential files
//       /configs/<name>    per-collector drift tracking records
//         /backup          copies of files as found before the first install
//     /sbin                the `cma` binary

pub const ETC_DIR: &str = "etc";
pub const ID_DIR: &str = ".id";
pub const TRACKING_DIR: &str = "configs";
pub const BACKUP_DIR: &str = "backup";

pub const CONFIG_FILE: &str = "cma.yaml";
pub const INVENTORY_FILE: &str = "inventory.yaml";
pub const INSTALLED_FILE: &str = "agents.yaml";

pub const JWT_FILE: &str = "jt";
pub const MANAGER_ID_FILE: &str = "ai";
pub const REFRESH_TOKEN_FILE: &str = "rft";

const TRACKING_SUFFIX: &str = ".current.yaml";
const BACKUP_SUFFIX: &str = ".orig";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Default etc directory: `<dir of executable>/../etc`.
///
/// Falls back to `./etc` when the executable path cannot be resolved.
pub fn default_etc_dir() -> PathBuf {
    std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .ok()
        .and_then(|p| p.parent().and_then(Path::parent).map(Path::to_path_buf))
        .map(|base| base.join(ETC_DIR))
        .unwrap_or_else(|| PathBuf::from(ETC_DIR))
}

pub fn config_path(etc: &Path) -> PathBuf {
    etc.join(CONFIG_FILE)
}

pub fn inventory_path(etc: &Path) -> PathBuf {
    etc.join(INVENTORY_FILE)
}

pub fn installed_path(etc: &Path) -> PathBuf {
    etc.join(INSTALLED_FILE)
}

pub fn id_dir(etc: &Path) -> PathBuf {
    etc.join(ID_DIR)
}

pub fn jwt_path(etc: &Path) -> PathBuf {
    id_dir(etc).join(JWT_FILE)
}

pub fn manager_id_path(etc: &Path) -> PathBuf {
    id_dir(etc).join(MANAGER_ID_FILE)
}

pub fn refresh_token_path(etc: &Path) -> PathBuf {
    id_dir(etc).join(REFRESH_TOKEN_FILE)
}

pub fn tracking_dir(etc: &Path, collector: &str) -> PathBuf {
    etc.join(TRACKING_DIR).join(collector)
}

/// Tracking record for one managed config file.
///
/// The name carries the file's base name for readability plus a digest of
/// the full path, so two files sharing a base name never share a record.
pub fn tracking_record(etc: &Path, collector: &str, config_file: &Path) -> PathBuf {
    tracking_dir(etc, collector).join(format!("{}{TRACKING_SUFFIX}", file_key(config_file)))
}

pub fn backup_dir(etc: &Path, collector: &str) -> PathBuf {
    tracking_dir(etc, collector).join(BACKUP_DIR)
}

/// Where the pre-install copy of `config_file` is kept.
pub fn backup_file(etc: &Path, collector: &str, config_file: &Path) -> PathBuf {
    backup_dir(etc, collector).join(format!("{}{BACKUP_SUFFIX}", file_key(config_file)))
}

fn file_key(config_file: &Path) -> String {
    let name = config_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let digest = Sha256::digest(config_file.as_os_str().as_encoded_bytes());
    let short: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{name}.{short}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
