//! Database service lifecycle on the local node
//!
//! Handles:
//! - Install, start, stop and restart of the database server process
//! - Status probing through an administrative session
//! - Privileged OS commands (package manager, init scripts, config files)
//! - Restoring a backup archive into the data directory
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────┐
//! │              LifecycleController               │
//! ├────────────────────────────────────────────────┤
//! │ ProcessControl │ PackageManager │ ConfigApplier│
//! │      (CommandExecutor, sudo)                   │
//! ├────────────────────────────────────────────────┤
//! │ StatusMonitor ──► Connector ──► Driver         │
//! └────────────────────────────────────────────────┘
//! ```

pub mod executor;
pub mod lifecycle;
pub mod packages;
pub mod process;
pub mod restore;
pub mod server_config;
pub mod status;

pub use executor::CommandExecutor;
pub use lifecycle::LifecycleController;
pub use packages::{AptPackages, PackageManager};
pub use process::{ProcessCommands, ProcessControl, SystemProcessControl};
pub use restore::RestoreStrategy;
pub use server_config::{ConfigApplier, FileConfigApplier};
pub use status::{StatusMonitor, StatusReporter, TracingReporter};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the database server as reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Running,
    Shutdown,
    Building,
    Failed,
    #[default]
    Unknown,
}

impl ServiceStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Running => "RUNNING",
            ServiceStatus::Shutdown => "SHUTDOWN",
            ServiceStatus::Building => "BUILDING",
            ServiceStatus::Failed => "FAILED",
            ServiceStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
