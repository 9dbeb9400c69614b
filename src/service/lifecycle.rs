use super::packages::PackageManager;
use super::process::ProcessControl;
use super::server_config::ConfigApplier;
use super::status::StatusMonitor;
use super::ServiceStatus;
use crate::admin::{AdminManager, AdminUser, Datastore};
use crate::error::{AgentError, Result};
use crate::superuser::SuperuserStore;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const GENERATED_PASSWORD_LEN: usize = 32;

/// Drives the server process through install, start, stop and restart.
///
/// Transitions are sequential per node; callers provide mutual exclusion.
pub struct LifecycleController {
    monitor: Arc<StatusMonitor>,
    process: Arc<dyn ProcessControl>,
    packages: Arc<dyn PackageManager>,
    config: Arc<dyn ConfigApplier>,
    superuser: Arc<SuperuserStore>,
    admin: Arc<AdminManager>,
    datastore: Datastore,
    state_change_wait: Duration,
    install_timeout: Duration,
}

/// Clears the restart marker when dropped, so an error, panic or cancelled
/// future cannot leave it set.
struct RestartGuard<'a>(&'a StatusMonitor);

impl<'a> RestartGuard<'a> {
    fn begin(monitor: &'a StatusMonitor) -> Self {
        monitor.begin_restart();
        Self(monitor)
    }
}

impl Drop for RestartGuard<'_> {
    fn drop(&mut self) {
        self.0.clear_restart();
    }
}

impl LifecycleController {
    pub fn new(
        monitor: Arc<StatusMonitor>,
        process: Arc<dyn ProcessControl>,
        packages: Arc<dyn PackageManager>,
        config: Arc<dyn ConfigApplier>,
        superuser: Arc<SuperuserStore>,
        admin: Arc<AdminManager>,
    ) -> Self {
        Self {
            monitor,
            process,
            packages,
            config,
            superuser,
            admin,
            datastore: Datastore::default(),
            state_change_wait: Duration::from_secs(600),
            install_timeout: Duration::from_secs(10000),
        }
    }

    pub fn with_datastore(mut self, datastore: Datastore) -> Self {
        self.datastore = datastore;
        self
    }

    pub fn with_state_change_wait(mut self, wait: Duration) -> Self {
        self.state_change_wait = wait;
        self
    }

    pub fn with_install_timeout(mut self, timeout: Duration) -> Self {
        self.install_timeout = timeout;
        self
    }

    pub fn monitor(&self) -> &StatusMonitor {
        &self.monitor
    }

    /// Probe the server unless a transition owns the status.
    pub async fn refresh_status(&self) -> ServiceStatus {
        let current = self.monitor.status();
        if self.monitor.is_restarting() || current == ServiceStatus::Building {
            return current;
        }
        let actual = self.monitor.probe_actual_status().await;
        self.monitor.set_status(actual, false);
        actual
    }

    pub async fn install_if_needed(&self, packages: &[String]) -> Result<()> {
        info!("Preparing guest as a {} server", self.datastore);
        if self.packages.is_installed(packages).await? {
            debug!("Packages already installed: {}", packages.join(" "));
            return Ok(());
        }

        self.monitor.begin_install();
        info!("Installing {} server", self.datastore);
        if let Err(e) = self.packages.install(packages, self.install_timeout).await {
            error!("Failed to install {}: {}", packages.join(" "), e);
            self.monitor.mark_failed(true);
            return Err(e);
        }
        debug!("Finished installing {} server", self.datastore);
        Ok(())
    }

    pub async fn complete_install_or_restart(&self) {
        self.monitor.end_install_or_restart().await;
    }

    pub async fn init_storage_structure(&self, mount_point: &Path) {
        if let Err(e) = self.process.init_storage(mount_point).await {
            error!(
                "Error while initiating storage structure at {}: {}",
                mount_point.display(),
                e
            );
        }
    }

    pub async fn start_db(&self, update_external: bool) -> Result<()> {
        self.reject_during_restart("start")?;
        self.start_inner(update_external).await
    }

    pub async fn stop_db(&self, update_external: bool, disable_on_boot: bool) -> Result<()> {
        self.reject_during_restart("stop")?;
        self.stop_inner(update_external, disable_on_boot).await
    }

    pub async fn restart(&self) -> Result<()> {
        self.reject_during_restart("restart")?;

        let result = {
            let _guard = RestartGuard::begin(&self.monitor);
            info!("Restarting {} server", self.datastore);
            match self.stop_inner(false, false).await {
                Ok(()) => self.start_inner(false).await,
                Err(e) => Err(e),
            }
        };

        self.monitor.end_install_or_restart().await;
        result
    }

    /// Apply configuration and start. Never restarts a running server.
    pub async fn start_db_with_conf_changes(&self, contents: &str) -> Result<()> {
        info!("Starting {} with configuration changes", self.datastore);
        let actual = self.monitor.probe_actual_status().await;
        debug!("Server status before applying configuration: {}", actual);
        if actual.is_running() {
            error!(
                "Cannot apply configuration changes because {} status is {}",
                self.datastore, actual
            );
            return Err(AgentError::PreconditionViolated(format!(
                "{} must be stopped to apply configuration changes",
                self.datastore
            )));
        }

        self.config.apply(contents).await?;
        self.start_db(true).await
    }

    pub async fn reset_configuration(&self, contents: &str) -> Result<()> {
        debug!("Resetting configuration");
        self.config.apply(contents).await
    }

    /// Rotate the superuser's password to a random one.
    ///
    /// The credential file is written before the server-side change so a
    /// crash in between still leaves the new password recoverable.
    pub async fn configure_superuser_access(&self) -> Result<AdminUser> {
        let (name, _) = self.datastore.default_superuser();
        let rotated = AdminUser::new(name, generate_password());
        let previous = self.superuser.current();
        let had_stored = self.superuser.has_stored_credentials();

        self.superuser.persist(&rotated)?;

        if let Err(e) = self.admin.alter_user_password(&rotated).await {
            error!("Failed to rotate superuser password: {}", e);
            let restored = if had_stored {
                self.superuser.persist(&previous)
            } else {
                self.superuser.forget()
            };
            if let Err(cleanup) = restored {
                warn!("Failed to restore previous credential file: {}", cleanup);
            }
            return Err(e);
        }

        self.superuser.replace(rotated.clone());
        Ok(rotated)
    }

    fn reject_during_restart(&self, operation: &str) -> Result<()> {
        if self.monitor.is_restarting() {
            return Err(AgentError::PreconditionViolated(format!(
                "cannot {} while a restart is in progress",
                operation
            )));
        }
        Ok(())
    }

    async fn start_inner(&self, update_external: bool) -> Result<()> {
        self.process.enable_on_boot().await?;
        if let Err(e) = self.process.start().await {
            // Judged by the status wait below.
            error!("Error starting {}: {}", self.datastore, e);
        }

        if self
            .monitor
            .wait_for_status_to_change(ServiceStatus::Running, self.state_change_wait, update_external)
            .await
        {
            info!("{} server is running", self.datastore);
            return Ok(());
        }

        warn!("{} did not start in time, killing it", self.datastore);
        if let Err(e) = self.process.kill().await {
            error!("Error killing {} start command: {}", self.datastore, e);
        }
        self.monitor.mark_failed(update_external);
        Err(AgentError::FatalTransition {
            operation: "start",
            target: ServiceStatus::Running,
            timeout_secs: self.state_change_wait.as_secs(),
        })
    }

    async fn stop_inner(&self, update_external: bool, disable_on_boot: bool) -> Result<()> {
        if disable_on_boot {
            self.process.disable_on_boot().await?;
        }
        self.process.stop().await?;

        if self
            .monitor
            .wait_for_status_to_change(ServiceStatus::Shutdown, self.state_change_wait, update_external)
            .await
        {
            info!("{} server stopped", self.datastore);
            return Ok(());
        }

        error!("Could not stop {}", self.datastore);
        self.monitor.mark_failed(update_external);
        Err(AgentError::FatalTransition {
            operation: "stop",
            target: ServiceStatus::Shutdown,
            timeout_secs: self.state_change_wait.as_secs(),
        })
    }
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}
