use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dbagent")]
#[command(version)]
#[command(about = "Guest agent for a host-local database server", long_about = None)]
pub(crate) struct Cli {
    /// Agent config file. Can also be set via DBAGENT_CONFIG env var.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Execute one JSON request and print the JSON response
    Request {
        /// Request file; reads stdin when omitted or "-"
        file: Option<PathBuf>,
    },

    /// Probe and print the server status
    Status,

    /// Install the server packages unless already present
    Install {
        /// Packages to install (defaults to the configured set)
        #[arg(short, long = "package")]
        packages: Vec<String>,
    },

    /// Finish an install or restart and resync the status
    CompleteInstall,

    /// Prepare the storage mount point
    InitStorage {
        mount_point: PathBuf,
    },

    /// Start the server and wait until it is running
    Start {
        /// Report the resulting status to the orchestrator
        #[arg(long)]
        update_status: bool,
    },

    /// Stop the server and wait until it is down
    Stop {
        /// Report the resulting status to the orchestrator
        #[arg(long)]
        update_status: bool,

        /// Do not start the server on the next boot
        #[arg(long)]
        disable_on_boot: bool,
    },

    /// Stop, then start the server
    Restart,

    /// Apply a server config file to a stopped server and start it
    StartWithConfig {
        file: PathBuf,
    },

    /// Replace the server config file without touching the process
    ResetConfig {
        file: PathBuf,
    },

    /// Rotate the superuser password and store it locally
    ConfigureSuperuser,

    /// Restore a backup archive into the data directory
    Restore {
        /// Restore strategy (e.g., nodetoolsnapshot)
        #[arg(long, default_value = "nodetoolsnapshot")]
        strategy: String,

        /// Tar archive to restore
        archive: PathBuf,
    },

    /// Manage database users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Manage databases (keyspaces)
    Database {
        #[command(subcommand)]
        command: DatabaseCommands,
    },
}

#[derive(Subcommand)]
pub(crate) enum UserCommands {
    /// Create a user with full access to the given databases
    Create {
        name: String,

        #[arg(long)]
        password: String,

        #[arg(short, long = "database")]
        databases: Vec<String>,
    },

    /// Drop a user
    Delete { name: String },

    /// Show a user and its databases
    Get { name: String },

    /// List users
    List,

    /// Grant full access on databases
    Grant {
        name: String,

        #[arg(short, long = "database", required = true)]
        databases: Vec<String>,
    },

    /// Grant one permission modifier on a database
    GrantPermission {
        name: String,
        database: String,
        /// ALTER, CREATE, DROP, MODIFY or SELECT
        modifier: String,
    },

    /// Revoke all access on a database
    Revoke { name: String, database: String },

    /// Rename a user and/or change its password
    Update {
        name: String,

        #[arg(long)]
        new_name: Option<String>,

        #[arg(long)]
        new_password: Option<String>,
    },

    /// Change a user's password
    ChangePassword {
        name: String,

        #[arg(long)]
        password: String,
    },

    /// List the databases a user can access
    Access { name: String },
}

#[derive(Subcommand)]
pub(crate) enum DatabaseCommands {
    /// Create databases
    Create {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Drop a database
    Delete { name: String },

    /// List databases
    List,
}
