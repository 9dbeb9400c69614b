use std::path::PathBuf;

const DBAGENT_CONFIG: &str = "DBAGENT_CONFIG";
const DBAGENT_CREDENTIALS: &str = "DBAGENT_CREDENTIALS";
const DBAGENT_SUDO_USER: &str = "DBAGENT_SUDO_USER";

const FALLBACK_CONFIG_DIR: &str = "~/.config";
const FALLBACK_DATA_DIR: &str = "~/.local/share";
const AGENT_SUBDIR: &str = "dbagent";

/// Non-empty value of an environment variable.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Agent config directory (~/.config/dbagent)
pub fn config_dir() -> PathBuf {
    let dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(FALLBACK_CONFIG_DIR))
        .join(AGENT_SUBDIR);
    tracing::trace!(dir = %dir.display(), "Resolved config directory");
    dir
}

/// Agent config file ($DBAGENT_CONFIG or ~/.config/dbagent/agent.toml)
pub fn config_path() -> PathBuf {
    let path = env_opt(DBAGENT_CONFIG)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join("agent.toml"));
    tracing::trace!(path = %path.display(), "Config path");
    path
}

/// Superuser credential file override ($DBAGENT_CREDENTIALS)
pub fn credentials_path() -> Option<PathBuf> {
    let val = env_opt(DBAGENT_CREDENTIALS).map(PathBuf::from);
    tracing::trace!(value = ?val, "DBAGENT_CREDENTIALS env var");
    val
}

/// Default credential file (~/.local/share/dbagent/auth/credentials.toml)
pub fn default_credentials_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(FALLBACK_DATA_DIR))
        .join(AGENT_SUBDIR)
        .join("auth")
        .join("credentials.toml")
}

/// Account privileged commands run as ($DBAGENT_SUDO_USER, root when unset)
pub fn sudo_user() -> Option<String> {
    let val = env_opt(DBAGENT_SUDO_USER);
    tracing::trace!(value = ?val, "DBAGENT_SUDO_USER env var");
    val
}
