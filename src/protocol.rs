//! Orchestrator request/response types
//!
//! JSON documents tagged by `op` (requests) and `result` (responses). Whatever
//! RPC boundary carries them hands one [`Request`] to
//! [`GuestAgent::handle_request`](crate::agent::GuestAgent::handle_request).

use crate::admin::{AdminUser, DatabaseUser, Schema, UserAttributes};
use crate::error::{AgentError, ErrorKind};
use crate::service::{RestoreStrategy, ServiceStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    // Service lifecycle
    GetStatus,
    InstallIfNeeded {
        /// Configured package set when omitted
        #[serde(default)]
        packages: Option<Vec<String>>,
    },
    CompleteInstallOrRestart,
    InitStorageStructure {
        mount_point: PathBuf,
    },
    StartDb {
        #[serde(default)]
        update_external: bool,
    },
    StopDb {
        #[serde(default)]
        update_external: bool,
        #[serde(default)]
        disable_on_boot: bool,
    },
    Restart,
    StartDbWithConfChanges {
        config_contents: String,
    },
    ResetConfiguration {
        config_contents: String,
    },
    ConfigureSuperuserAccess,
    Restore {
        strategy: RestoreStrategy,
        /// Tar archive on local disk
        archive: PathBuf,
    },

    // Users
    CreateUser {
        users: Vec<DatabaseUser>,
    },
    DeleteUser {
        name: String,
    },
    GetUser {
        name: String,
    },
    ListUsers,
    GrantAccess {
        username: String,
        databases: Vec<String>,
    },
    GrantPermission {
        username: String,
        database: String,
        modifier: String,
    },
    RevokeAccess {
        username: String,
        database: String,
    },
    UpdateAttributes {
        username: String,
        attributes: UserAttributes,
    },
    ChangePasswords {
        users: Vec<DatabaseUser>,
    },
    ListAccess {
        username: String,
    },

    // Databases
    CreateDatabase {
        databases: Vec<Schema>,
    },
    DeleteDatabase {
        database: Schema,
    },
    ListDatabases,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::GetStatus => "get_status",
            Request::InstallIfNeeded { .. } => "install_if_needed",
            Request::CompleteInstallOrRestart => "complete_install_or_restart",
            Request::InitStorageStructure { .. } => "init_storage_structure",
            Request::StartDb { .. } => "start_db",
            Request::StopDb { .. } => "stop_db",
            Request::Restart => "restart",
            Request::StartDbWithConfChanges { .. } => "start_db_with_conf_changes",
            Request::ResetConfiguration { .. } => "reset_configuration",
            Request::ConfigureSuperuserAccess => "configure_superuser_access",
            Request::Restore { .. } => "restore",
            Request::CreateUser { .. } => "create_user",
            Request::DeleteUser { .. } => "delete_user",
            Request::GetUser { .. } => "get_user",
            Request::ListUsers => "list_users",
            Request::GrantAccess { .. } => "grant_access",
            Request::GrantPermission { .. } => "grant_permission",
            Request::RevokeAccess { .. } => "revoke_access",
            Request::UpdateAttributes { .. } => "update_attributes",
            Request::ChangePasswords { .. } => "change_passwords",
            Request::ListAccess { .. } => "list_access",
            Request::CreateDatabase { .. } => "create_database",
            Request::DeleteDatabase { .. } => "delete_database",
            Request::ListDatabases => "list_databases",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Status {
        status: ServiceStatus,
        restart_in_progress: bool,
    },
    Superuser {
        user: AdminUser,
    },
    User {
        user: DatabaseUser,
    },
    Users {
        users: Vec<DatabaseUser>,
    },
    Databases {
        databases: Vec<Schema>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}

impl From<AgentError> for Response {
    fn from(e: AgentError) -> Self {
        Response::Error {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}
