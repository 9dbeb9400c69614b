//! Superuser credential provider.
//!
//! Loaded once at startup from the local credential file, falling back to the
//! datastore's built-in account when the file does not exist. Every component
//! that opens a session reads the current credential from here, and
//! `configure_superuser_access` swaps it after rotating the password.

use crate::admin::models::AdminUser;
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info, trace};

const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

#[derive(Serialize, Deserialize)]
struct CredentialFile {
    authentication: AuthenticationSection,
}

#[derive(Serialize, Deserialize)]
struct AuthenticationSection {
    username: String,
    password: String,
}

pub struct SuperuserStore {
    path: PathBuf,
    current: RwLock<AdminUser>,
}

impl SuperuserStore {
    pub fn load(path: impl Into<PathBuf>, default: AdminUser) -> Result<Self> {
        let path = path.into();
        let current = if path.exists() {
            trace!(path = %path.display(), "Loading stored superuser credentials");
            read_credentials(&path)?
        } else {
            debug!("No stored superuser credentials, using the built-in account");
            default
        };

        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_stored_credentials(&self) -> bool {
        self.path.exists()
    }

    pub fn current(&self) -> AdminUser {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn replace(&self, user: AdminUser) {
        info!("Switching superuser credentials to '{}'", user.name);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    /// Write the credential file with owner-only permissions.
    pub fn persist(&self, user: &AdminUser) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
                set_mode(dir, DIR_MODE)?;
            }
        }

        let contents = toml::to_string_pretty(&CredentialFile {
            authentication: AuthenticationSection {
                username: user.name.clone(),
                password: user.password.clone(),
            },
        })
        .map_err(|e| AgentError::Config(format!("failed to serialize credentials: {}", e)))?;

        write_private(&self.path, contents.as_bytes())?;
        debug!(path = %self.path.display(), "Stored superuser credentials");
        Ok(())
    }

    /// Remove the credential file so the next load falls back to the default.
    pub fn forget(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
            debug!(path = %self.path.display(), "Removed stored superuser credentials");
        }
        Ok(())
    }
}

fn read_credentials(path: &Path) -> Result<AdminUser> {
    let content = fs::read_to_string(path)?;
    let file: CredentialFile = toml::from_str(&content).map_err(|e| {
        AgentError::Config(format!("failed to parse {}: {}", path.display(), e))
    })?;
    Ok(AdminUser::new(
        file.authentication.username,
        file.authentication.password,
    ))
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    // An existing file keeps its old mode on open.
    set_mode(path, FILE_MODE)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
