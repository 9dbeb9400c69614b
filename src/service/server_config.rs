use super::executor::{argv, CommandExecutor};
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Writes the database server's configuration file.
#[async_trait]
pub trait ConfigApplier: Send + Sync {
    async fn apply(&self, contents: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfigSettings {
    pub path: PathBuf,
    /// Account that owns the server's files.
    pub owner: String,
}

impl Default for ServerConfigSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/cassandra/cassandra.yaml"),
            owner: "cassandra".to_string(),
        }
    }
}

/// Stages the contents in a private temp file, then moves it into place as
/// root and hands it to the server owner.
pub struct FileConfigApplier {
    executor: CommandExecutor,
    settings: ServerConfigSettings,
}

impl FileConfigApplier {
    pub fn new(executor: CommandExecutor, settings: ServerConfigSettings) -> Self {
        Self { executor, settings }
    }

    async fn install(&self, staged: &str) -> Result<()> {
        let target = self.settings.path.display().to_string();
        let owner = format!("{0}:{0}", self.settings.owner);

        self.executor
            .sudo_run(&argv(&["mv", staged, &target]), None)
            .await?;
        self.executor
            .sudo_run(&argv(&["chown", &owner, &target]), None)
            .await?;
        self.executor
            .sudo_run(&argv(&["chmod", "a+r", &target]), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ConfigApplier for FileConfigApplier {
    async fn apply(&self, contents: &str) -> Result<()> {
        // Created with mode 0600 and O_EXCL.
        let mut staged = tempfile::Builder::new()
            .prefix("dbagent-conf")
            .tempfile()?;
        staged.write_all(contents.as_bytes())?;
        staged.flush()?;

        // Keep the file on disk once `mv` may have consumed it.
        let (file, path) = staged.keep().map_err(|e| AgentError::Io(e.error))?;
        drop(file);
        let staged_path = path.display().to_string();
        debug!("Storing temporary configuration at {}", staged_path);

        if let Err(e) = self.install(&staged_path).await {
            error!("Failed to install configuration {}: {}", staged_path, e);
            if path.exists() {
                if let Err(cleanup) = std::fs::remove_file(&path) {
                    warn!("Failed to remove staged configuration {}: {}", staged_path, cleanup);
                }
            }
            return Err(e);
        }

        info!("Wrote new server configuration to {}", self.settings.path.display());
        Ok(())
    }
}
