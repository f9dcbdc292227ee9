use crate::error::{AgentError, Result};
use crate::paths;
use std::path::{Path, PathBuf};

/// Credential files under `<etc>/.id/`.
///
/// The JWT authenticates every control-plane call, the refresh token and
/// manager id are only used to obtain a new JWT.
#[derive(Debug, Clone)]
pub struct Credentials {
    etc: PathBuf,
}

impl Credentials {
    pub fn new(etc: impl Into<PathBuf>) -> Self {
        Self { etc: etc.into() }
    }

    pub fn load_jwt(&self) -> Result<String> {
        read(&paths::jwt_path(&self.etc), "access token")
    }

    pub fn save_jwt(&self, token: &str) -> Result<()> {
        write(&paths::jwt_path(&self.etc), token, "access token")
    }

    pub fn load_manager_id(&self) -> Result<String> {
        read(&paths::manager_id_path(&self.etc), "manager id")
    }

    pub fn save_manager_id(&self, id: &str) -> Result<()> {
        write(&paths::manager_id_path(&self.etc), id, "manager id")
    }

    pub fn load_refresh_token(&self) -> Result<String> {
        read(&paths::refresh_token_path(&self.etc), "refresh token")
    }

    pub fn save_refresh_token(&self, token: &str) -> Result<()> {
        write(&paths::refresh_token_path(&self.etc), token, "refresh token")
    }
}

fn read(path: &Path, what: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AgentError::Credentials(format!("reading {what} {}: {e}", path.display())))?;
    let value = raw.trim();
    if value.is_empty() {
        return Err(AgentError::Credentials(format!(
            "invalid {what} (empty) in {}",
            path.display()
        )));
    }
    Ok(value.to_string())
}

fn write(path: &Path, value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AgentError::Credentials(format!("invalid {what} (empty)")));
    }
    crate::io::write_private(path, value.as_bytes())
}
