use super::executor::{argv, CommandExecutor};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// OS-level control of the database server process.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    /// Forcibly terminate the server, including a start that never finished.
    async fn kill(&self) -> Result<()>;
    async fn enable_on_boot(&self) -> Result<()>;
    async fn disable_on_boot(&self) -> Result<()>;
    async fn init_storage(&self, mount_point: &Path) -> Result<()>;
}

/// Command lines run (through sudo) for each process action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessCommands {
    pub start: Vec<String>,
    pub stop: Vec<String>,
    pub kill: Vec<String>,
    pub enable_on_boot: Vec<String>,
    pub disable_on_boot: Vec<String>,
    /// `{mount_point}` is replaced with the storage mount point.
    pub init_storage: Vec<String>,
    pub command_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for ProcessCommands {
    fn default() -> Self {
        Self {
            start: argv(&["/etc/init.d/cassandra", "start"]),
            stop: argv(&["/etc/init.d/cassandra", "stop"]),
            kill: argv(&["killall", "java"]),
            enable_on_boot: argv(&["update-rc.d", "cassandra", "enable"]),
            disable_on_boot: argv(&["update-rc.d", "cassandra", "disable"]),
            init_storage: argv(&["mkdir", "-p", "{mount_point}"]),
            command_timeout_secs: 120,
            stop_timeout_secs: 60,
        }
    }
}

pub struct SystemProcessControl {
    executor: CommandExecutor,
    commands: ProcessCommands,
}

impl SystemProcessControl {
    pub fn new(executor: CommandExecutor, commands: ProcessCommands) -> Self {
        Self { executor, commands }
    }

    fn command_timeout(&self) -> Option<Duration> {
        Some(Duration::from_secs(self.commands.command_timeout_secs))
    }
}

#[async_trait]
impl ProcessControl for SystemProcessControl {
    async fn start(&self) -> Result<()> {
        self.executor
            .sudo_run(&self.commands.start, self.command_timeout())
            .await?;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let timeout = Duration::from_secs(self.commands.stop_timeout_secs);
        self.executor
            .sudo_run(&self.commands.stop, Some(timeout))
            .await?;
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        self.executor
            .sudo_run(&self.commands.kill, self.command_timeout())
            .await?;
        Ok(())
    }

    async fn enable_on_boot(&self) -> Result<()> {
        self.executor
            .sudo_run(&self.commands.enable_on_boot, self.command_timeout())
            .await?;
        Ok(())
    }

    async fn disable_on_boot(&self) -> Result<()> {
        self.executor
            .sudo_run(&self.commands.disable_on_boot, self.command_timeout())
            .await?;
        Ok(())
    }

    async fn init_storage(&self, mount_point: &Path) -> Result<()> {
        let argv = substitute_mount_point(&self.commands.init_storage, mount_point);
        debug!("Initializing storage structure at {}", mount_point.display());
        self.executor.sudo_run(&argv, self.command_timeout()).await?;
        Ok(())
    }
}

fn substitute_mount_point(argv: &[String], mount_point: &Path) -> Vec<String> {
    let mount_point = mount_point.display().to_string();
    argv.iter()
        .map(|arg| arg.replace("{mount_point}", &mount_point))
        .collect()
}
