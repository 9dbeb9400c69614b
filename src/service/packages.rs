use super::executor::CommandExecutor;
use crate::error::{AgentError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// OS package installation, used as an opaque "ensure installed" capability.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// True only when every package in the set is installed.
    async fn is_installed(&self, packages: &[String]) -> Result<bool>;
    async fn install(&self, packages: &[String], timeout: Duration) -> Result<()>;
}

/// Debian packages through `dpkg-query` and `apt-get`.
pub struct AptPackages {
    executor: CommandExecutor,
}

impl AptPackages {
    pub fn new(executor: CommandExecutor) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl PackageManager for AptPackages {
    async fn is_installed(&self, packages: &[String]) -> Result<bool> {
        for package in packages {
            let argv = vec![
                "dpkg-query".to_string(),
                "-W".to_string(),
                "-f=${Status}".to_string(),
                package.clone(),
            ];
            match self.executor.run(&argv, None).await {
                Ok(output) => {
                    let status = String::from_utf8_lossy(&output.stdout);
                    if !is_installed_status(&status) {
                        debug!("Package '{}' is not installed ({})", package, status.trim());
                        return Ok(false);
                    }
                }
                // dpkg-query exits non-zero for unknown packages.
                Err(AgentError::Process { reason, .. }) => {
                    debug!("Package '{}' is not installed: {}", package, reason);
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    async fn install(&self, packages: &[String], timeout: Duration) -> Result<()> {
        info!("Installing packages: {}", packages.join(" "));
        let mut argv: Vec<String> = [
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
            "--allow-unauthenticated",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        argv.extend(packages.iter().cloned());

        self.executor.sudo_run(&argv, Some(timeout)).await?;
        debug!("Finished installing packages");
        Ok(())
    }
}

fn is_installed_status(status: &str) -> bool {
    status.trim() == "install ok installed"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dpkg_status_parsing() {
        assert!(is_installed_status("install ok installed"));
        assert!(is_installed_status("install ok installed\n"));
        assert!(!is_installed_status("deinstall ok config-files"));
        assert!(!is_installed_status(""));
    }
}
