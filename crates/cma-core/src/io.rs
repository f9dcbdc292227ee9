use crate::error::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Mode applied to a managed config file that did not exist before.
pub const DEFAULT_CONFIG_MODE: u32 = 0o640;

/// Mode for agent-private state (tracking records, credentials, inventory).
pub const PRIVATE_MODE: u32 = 0o600;

/// Atomically write `data` to `path` using a tempfile in the same directory.
/// Prevents partial writes from corrupting state files.
///
/// `prepare` runs on the tempfile before it is renamed over `path`; if it
/// fails, `path` is left untouched.
fn write_with(
    path: &Path,
    data: &[u8],
    prepare: impl FnOnce(&File) -> Result<()>,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    prepare(tmp.as_file())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Atomically write agent-private state readable only by the owner.
pub fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    write_with(path, data, |file| set_mode(file, PRIVATE_MODE))
}

/// Replace a collector config file, keeping the permission bits and the
/// owner/group of the file being replaced.
///
/// A new file gets [`DEFAULT_CONFIG_MODE`] and the agent's own ownership.
/// Failing to restore ownership is reported as a write failure: a collector
/// running as a dedicated user may no longer be able to read its config.
/// Mode and owner are applied before the rename, so on any failure the
/// previous file is still in place.
pub fn write_preserving(path: &Path, data: &[u8]) -> Result<()> {
    let previous = std::fs::metadata(path).ok();
    write_with(path, data, |file| match &previous {
        Some(meta) => {
            set_mode(file, mode_of(meta))?;
            restore_owner(file, meta)
        }
        None => set_mode(file, DEFAULT_CONFIG_MODE),
    })
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &std::fs::Metadata) -> u32 {
    DEFAULT_CONFIG_MODE
}

#[cfg(unix)]
fn set_mode(file: &File, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_file: &File, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn restore_owner(file: &File, meta: &std::fs::Metadata) -> Result<()> {
    use std::os::unix::fs::MetadataExt;
    std::os::unix::fs::fchown(file, Some(meta.uid()), Some(meta.gid()))?;
    Ok(())
}

#[cfg(not(unix))]
fn restore_owner(_file: &File, _meta: &std::fs::Metadata) -> Result<()> {
    Ok(())
}
