use crate::admin::{AdminManager, AdminUser, Connector};
use crate::clienv;
use crate::config::AgentConfig;
use crate::driver::CqlshDriver;
use crate::error::Result;
use crate::protocol::{Request, Response};
use crate::service::restore::RestoreTarget;
use crate::service::server_config::FileConfigApplier;
use crate::service::{
    AptPackages, CommandExecutor, LifecycleController, StatusMonitor, SystemProcessControl,
};
use crate::superuser::SuperuserStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for orchestrator requests on this node.
pub struct GuestAgent {
    config: AgentConfig,
    lifecycle: LifecycleController,
    admin: Arc<AdminManager>,
    restore_target: RestoreTarget,
}

impl GuestAgent {
    pub fn new(
        config: AgentConfig,
        lifecycle: LifecycleController,
        admin: Arc<AdminManager>,
        restore_target: RestoreTarget,
    ) -> Self {
        Self {
            config,
            lifecycle,
            admin,
            restore_target,
        }
    }

    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: AgentConfig) -> Result<Self> {
        let (name, password) = config.datastore.default_superuser();
        let superuser = Arc::new(SuperuserStore::load(
            config.credentials_path(),
            AdminUser::new(name, password),
        )?);

        let driver = Arc::new(CqlshDriver::new(
            config.driver.cqlsh.clone(),
            config.driver.port,
        ));
        let connector = Connector::new(driver, config.contact_points.clone())
            .with_statement_timeout(config.statement_timeout());

        let admin = Arc::new(
            AdminManager::new(
                connector.clone(),
                Arc::clone(&superuser),
                config.datastore.dialect(),
            )
            .ignore_users(config.ignore_users.iter().cloned())
            .ignore_dbs(config.ignore_dbs.iter().cloned()),
        );

        let monitor = Arc::new(
            StatusMonitor::new(connector, Arc::clone(&superuser))
                .with_poll_interval(config.status_poll_interval()),
        );

        let executor = CommandExecutor::new(config.command_timeout())
            .with_sudo_user(clienv::sudo_user());

        let lifecycle = LifecycleController::new(
            monitor,
            Arc::new(SystemProcessControl::new(
                executor.clone(),
                config.process.clone(),
            )),
            Arc::new(AptPackages::new(executor.clone())),
            Arc::new(FileConfigApplier::new(
                executor.clone(),
                config.server_config.clone(),
            )),
            superuser,
            Arc::clone(&admin),
        )
        .with_datastore(config.datastore)
        .with_state_change_wait(config.state_change_wait())
        .with_install_timeout(config.install_timeout());

        let restore_target = RestoreTarget::new(
            executor,
            config.restore.data_dir.clone(),
            config.server_config.owner.clone(),
        )
        .with_timeout(config.restore_timeout());

        Ok(Self::new(config, lifecycle, admin, restore_target))
    }

    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    pub fn admin(&self) -> &AdminManager {
        &self.admin
    }

    pub async fn handle_request(&self, request: Request) -> Response {
        let op = request.name();
        debug!("Handling: {}", op);
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Request '{}' failed: {}", op, e);
                Response::from(e)
            }
        }
    }

    async fn dispatch(&self, request: Request) -> Result<Response> {
        let response = match request {
            Request::GetStatus => Response::Status {
                status: self.lifecycle.refresh_status().await,
                restart_in_progress: self.lifecycle.monitor().is_restarting(),
            },
            Request::InstallIfNeeded { packages } => {
                let packages = packages.unwrap_or_else(|| self.config.packages.clone());
                self.lifecycle.install_if_needed(&packages).await?;
                Response::Ok
            }
            Request::CompleteInstallOrRestart => {
                self.lifecycle.complete_install_or_restart().await;
                Response::Ok
            }
            Request::InitStorageStructure { mount_point } => {
                self.lifecycle.init_storage_structure(&mount_point).await;
                Response::Ok
            }
            Request::StartDb { update_external } => {
                self.lifecycle.start_db(update_external).await?;
                Response::Ok
            }
            Request::StopDb {
                update_external,
                disable_on_boot,
            } => {
                self.lifecycle
                    .stop_db(update_external, disable_on_boot)
                    .await?;
                Response::Ok
            }
            Request::Restart => {
                self.lifecycle.restart().await?;
                Response::Ok
            }
            Request::StartDbWithConfChanges { config_contents } => {
                self.lifecycle
                    .start_db_with_conf_changes(&config_contents)
                    .await?;
                Response::Ok
            }
            Request::ResetConfiguration { config_contents } => {
                self.lifecycle.reset_configuration(&config_contents).await?;
                Response::Ok
            }
            Request::ConfigureSuperuserAccess => Response::Superuser {
                user: self.lifecycle.configure_superuser_access().await?,
            },
            Request::Restore { strategy, archive } => {
                info!("Restoring from {}", archive.display());
                let stream = std::fs::File::open(&archive)?;
                strategy.restore(&self.restore_target, stream).await?;
                Response::Ok
            }
            Request::CreateUser { users } => {
                self.admin.create_users(&users).await?;
                Response::Ok
            }
            Request::DeleteUser { name } => {
                self.admin.delete_user(&name).await?;
                Response::Ok
            }
            Request::GetUser { name } => Response::User {
                user: self.admin.get_user(&name).await?,
            },
            Request::ListUsers => Response::Users {
                users: self.admin.list_users().await?,
            },
            Request::GrantAccess {
                username,
                databases,
            } => {
                self.admin.grant_access(&username, &databases).await?;
                Response::Ok
            }
            Request::GrantPermission {
                username,
                database,
                modifier,
            } => {
                self.admin
                    .grant_permission(&username, &database, &modifier)
                    .await?;
                Response::Ok
            }
            Request::RevokeAccess { username, database } => {
                self.admin.revoke_access(&username, &database).await?;
                Response::Ok
            }
            Request::UpdateAttributes {
                username,
                attributes,
            } => {
                self.admin.update_attributes(&username, &attributes).await?;
                Response::Ok
            }
            Request::ChangePasswords { users } => {
                self.admin.change_passwords(&users).await?;
                Response::Ok
            }
            Request::ListAccess { username } => Response::Databases {
                databases: self.admin.list_access(&username).await?,
            },
            Request::CreateDatabase { databases } => {
                self.admin.create_databases(&databases).await?;
                Response::Ok
            }
            Request::DeleteDatabase { database } => {
                self.admin.delete_database(&database).await?;
                Response::Ok
            }
            Request::ListDatabases => Response::Databases {
                databases: self.admin.list_databases().await?,
            },
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::{DatabaseUser, Schema};
    use crate::error::ErrorKind;
    use crate::service::ServiceStatus;
    use crate::testing::{FakeConfigApplier, FakePackages, FakeProcessControl, MemoryEngine};
    use std::time::Duration;

    fn agent(engine: &MemoryEngine) -> GuestAgent {
        let admin = Arc::new(engine.admin_manager());
        let monitor = Arc::new(
            StatusMonitor::new(engine.connector(), engine.superuser_store())
                .with_poll_interval(Duration::from_millis(10)),
        );
        let lifecycle = LifecycleController::new(
            monitor,
            Arc::new(FakeProcessControl::new(engine.clone())),
            Arc::new(FakePackages::installed()),
            Arc::new(FakeConfigApplier::default()),
            engine.superuser_store(),
            Arc::clone(&admin),
        )
        .with_state_change_wait(Duration::from_millis(200));
        let restore_target = RestoreTarget::new(
            CommandExecutor::new(Duration::from_secs(5)),
            std::env::temp_dir().join("dbagent-restore-unused"),
            "cassandra",
        );
        GuestAgent::new(AgentConfig::default(), lifecycle, admin, restore_target)
    }

    #[tokio::test]
    async fn test_user_scenario_through_requests() {
        let engine = MemoryEngine::new();
        let agent = agent(&engine);

        let response = agent
            .handle_request(Request::CreateDatabase {
                databases: vec![Schema::new("orders")],
            })
            .await;
        assert_eq!(response, Response::Ok);

        let response = agent
            .handle_request(Request::CreateUser {
                users: vec![DatabaseUser::new("alice")
                    .with_password("pw1")
                    .with_databases(["orders"])],
            })
            .await;
        assert_eq!(response, Response::Ok);

        let response = agent
            .handle_request(Request::ListAccess {
                username: "alice".to_string(),
            })
            .await;
        assert_eq!(
            response,
            Response::Databases {
                databases: vec![Schema::new("orders")]
            }
        );
    }

    #[tokio::test]
    async fn test_errors_carry_kind() {
        let engine = MemoryEngine::new();
        let agent = agent(&engine);

        let response = agent
            .handle_request(Request::GetUser {
                name: "nobody".to_string(),
            })
            .await;
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::NotFound,
                ..
            }
        ));

        let response = agent
            .handle_request(Request::GrantPermission {
                username: "nobody".to_string(),
                database: "orders".to_string(),
                modifier: "AUTHORIZE".to_string(),
            })
            .await;
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::InvalidRequest,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_get_status_probes_server() {
        let engine = MemoryEngine::new();
        let agent = agent(&engine);

        let response = agent.handle_request(Request::GetStatus).await;
        assert_eq!(
            response,
            Response::Status {
                status: ServiceStatus::Running,
                restart_in_progress: false
            }
        );

        engine.set_reachable(false);
        let response = agent.handle_request(Request::GetStatus).await;
        assert!(matches!(
            response,
            Response::Status {
                status: ServiceStatus::Shutdown,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_stop_then_start_requests() {
        let engine = MemoryEngine::new();
        let agent = agent(&engine);

        let response = agent
            .handle_request(Request::StopDb {
                update_external: true,
                disable_on_boot: false,
            })
            .await;
        assert_eq!(response, Response::Ok);
        assert_eq!(agent.lifecycle().monitor().status(), ServiceStatus::Shutdown);

        let response = agent
            .handle_request(Request::StartDb {
                update_external: true,
            })
            .await;
        assert_eq!(response, Response::Ok);
        assert!(agent.lifecycle().monitor().is_running());
    }

    #[tokio::test]
    async fn test_missing_archive_is_error() {
        let engine = MemoryEngine::new();
        let agent = agent(&engine);
        let dir = tempfile::tempdir().unwrap();

        let response = agent
            .handle_request(Request::Restore {
                strategy: crate::service::RestoreStrategy::NodetoolSnapshot,
                archive: dir.path().join("missing.tar"),
            })
            .await;
        assert!(matches!(
            response,
            Response::Error {
                kind: ErrorKind::Unexpected,
                ..
            }
        ));
    }
}
