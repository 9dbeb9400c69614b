use crate::args::Commands;
use anyhow::{Context, Result};
use dbagent::service::RestoreStrategy;
use dbagent::Request;
use std::path::Path;

/// Map a service subcommand to its request.
pub(crate) fn service_request(command: Commands) -> Result<Request> {
    let request = match command {
        Commands::Status => Request::GetStatus,
        Commands::Install { packages } => Request::InstallIfNeeded {
            packages: (!packages.is_empty()).then_some(packages),
        },
        Commands::CompleteInstall => Request::CompleteInstallOrRestart,
        Commands::InitStorage { mount_point } => Request::InitStorageStructure { mount_point },
        Commands::Start { update_status } => Request::StartDb {
            update_external: update_status,
        },
        Commands::Stop {
            update_status,
            disable_on_boot,
        } => Request::StopDb {
            update_external: update_status,
            disable_on_boot,
        },
        Commands::Restart => Request::Restart,
        Commands::StartWithConfig { file } => Request::StartDbWithConfChanges {
            config_contents: read_config(&file)?,
        },
        Commands::ResetConfig { file } => Request::ResetConfiguration {
            config_contents: read_config(&file)?,
        },
        Commands::ConfigureSuperuser => Request::ConfigureSuperuserAccess,
        Commands::Restore { strategy, archive } => Request::Restore {
            strategy: strategy.parse::<RestoreStrategy>()?,
            archive,
        },
        Commands::Request { .. } | Commands::User { .. } | Commands::Database { .. } => {
            anyhow::bail!("not a service command")
        }
    };
    Ok(request)
}

fn read_config(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read server config from {}", path.display()))
}
