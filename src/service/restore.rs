//! Restoring backup archives into the server's data directory.

use super::executor::{argv, CommandExecutor};
use crate::error::{AgentError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreStrategy {
    /// Archive of a `nodetool snapshot`, rooted inside the data directory.
    NodetoolSnapshot,
}

impl RestoreStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreStrategy::NodetoolSnapshot => "nodetoolsnapshot",
        }
    }

    /// Prepare the target, extract the stream into it, then fix ownership.
    pub async fn restore<R>(&self, target: &RestoreTarget, stream: R) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        info!(
            "Restoring {} archive into {}",
            self.as_str(),
            target.data_dir.display()
        );
        match self {
            RestoreStrategy::NodetoolSnapshot => {
                target.pre_restore().await?;
                target.extract(stream).await?;
                target.post_restore().await
            }
        }
    }
}

impl fmt::Display for RestoreStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestoreStrategy {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nodetoolsnapshot" => Ok(RestoreStrategy::NodetoolSnapshot),
            other => Err(AgentError::InvalidRequest(format!(
                "unknown restore strategy: {}",
                other
            ))),
        }
    }
}

/// Where and as whom restored files land.
pub struct RestoreTarget {
    executor: CommandExecutor,
    data_dir: PathBuf,
    owner: String,
    timeout: Option<Duration>,
}

impl RestoreTarget {
    pub fn new(executor: CommandExecutor, data_dir: impl Into<PathBuf>, owner: impl Into<String>) -> Self {
        Self {
            executor,
            data_dir: data_dir.into(),
            owner: owner.into(),
            timeout: None,
        }
    }

    /// Bound on the extraction step; the executor default applies otherwise.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The archive does not contain the data directory itself.
    async fn pre_restore(&self) -> Result<()> {
        debug!("Initializing data directory {}", self.data_dir.display());
        let dir = self.data_dir.display().to_string();
        self.executor
            .sudo_run(&argv(&["mkdir", "-p", &dir]), None)
            .await?;
        self.chown(false).await
    }

    /// Unpacked as root so archived modes survive inside the server-owned directory.
    async fn extract<R>(&self, stream: R) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        let dir = self.data_dir.display().to_string();
        debug!("Extracting archive into {}", dir);
        self.executor
            .sudo_run_with_input(&argv(&["tar", "-xpPf", "-", "-C", &dir]), stream, self.timeout)
            .await?;
        Ok(())
    }

    async fn post_restore(&self) -> Result<()> {
        debug!("Updating ownership of the restored files");
        self.chown(true).await
    }

    async fn chown(&self, recursive: bool) -> Result<()> {
        let dir = self.data_dir.display().to_string();
        let owner = format!("{0}:{0}", self.owner);
        let mut argv = vec!["chown".to_string()];
        if recursive {
            argv.push("-R".to_string());
        }
        argv.extend([owner, dir]);
        self.executor.sudo_run(&argv, None).await?;
        Ok(())
    }
}
