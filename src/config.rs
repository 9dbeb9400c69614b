use crate::admin::Datastore;
use crate::service::process::ProcessCommands;
use crate::service::server_config::ServerConfigSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Agent settings, read from `agent.toml`. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub datastore: Datastore,
    /// Hosts the administrative session connects to.
    pub contact_points: Vec<String>,
    /// Upper bound on a start or stop transition.
    pub state_change_wait_time_secs: u64,
    pub status_poll_interval_secs: u64,
    /// Per-statement timeout for administrative calls; unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_timeout_secs: Option<u64>,
    pub ignore_users: Vec<String>,
    pub ignore_dbs: Vec<String>,
    pub packages: Vec<String>,
    pub install_timeout_secs: u64,
    /// Superuser credential file; `$DBAGENT_CREDENTIALS` takes precedence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,
    pub process: ProcessCommands,
    pub server_config: ServerConfigSettings,
    pub driver: DriverSettings,
    pub restore: RestoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverSettings {
    pub cqlsh: String,
    pub port: u16,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            cqlsh: "cqlsh".to_string(),
            port: 9042,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RestoreSettings {
    /// First entry of the server's `data_file_directories`.
    pub data_dir: PathBuf,
    pub extract_timeout_secs: u64,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/cassandra/data"),
            extract_timeout_secs: 7200,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            datastore: Datastore::Cassandra,
            contact_points: vec!["127.0.0.1".to_string()],
            state_change_wait_time_secs: 600,
            status_poll_interval_secs: 3,
            statement_timeout_secs: None,
            ignore_users: vec!["os_admin".to_string()],
            ignore_dbs: [
                "system",
                "system_auth",
                "system_traces",
                "system_schema",
                "system_distributed",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            packages: vec!["cassandra".to_string()],
            install_timeout_secs: 10000,
            credentials_path: None,
            process: ProcessCommands::default(),
            server_config: ServerConfigSettings::default(),
            driver: DriverSettings::default(),
            restore: RestoreSettings::default(),
        }
    }
}

impl AgentConfig {
    /// $DBAGENT_CONFIG or ~/.config/dbagent/agent.toml
    pub fn config_path() -> PathBuf {
        crate::clienv::config_path()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tracing::trace!(path = %path.display(), "Loading agent config");

        if !path.exists() {
            tracing::trace!("Config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        tracing::trace!(datastore = %config.datastore, contact_points = ?config.contact_points, "Agent config loaded");
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Credential file: env override, then config, then the data directory.
    pub fn credentials_path(&self) -> PathBuf {
        crate::clienv::credentials_path()
            .or_else(|| self.credentials_path.clone())
            .unwrap_or_else(crate::clienv::default_credentials_path)
    }

    pub fn state_change_wait(&self) -> Duration {
        Duration::from_secs(self.state_change_wait_time_secs)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.status_poll_interval_secs)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs.map(Duration::from_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.process.command_timeout_secs)
    }

    pub fn restore_timeout(&self) -> Duration {
        Duration::from_secs(self.restore.extract_timeout_secs)
    }
}
