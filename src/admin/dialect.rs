//! Statement construction per datastore.
//!
//! Templates use `{}` for identifiers substituted verbatim by the session
//! (`{{`/`}}` escape literal braces) and `?` for values bound by the driver.

use super::models::Permission;
use crate::driver::{Row, Value};
use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub template: &'static str,
    pub identifiers: Vec<String>,
    pub values: Vec<Value>,
}

impl Statement {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            identifiers: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn ident(mut self, identifier: impl Into<String>) -> Self {
        self.identifiers.push(identifier.into());
        self
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }
}

/// Builds the administrative statements a backend understands and reads back
/// the rows its listing statements produce.
pub trait Dialect: Send + Sync {
    fn create_user(&self, name: &str, password: &str) -> Statement;
    fn drop_user(&self, name: &str) -> Statement;
    fn alter_user_password(&self, name: &str, password: &str) -> Statement;
    fn list_users(&self) -> Statement;
    /// `(name, is_superuser)` from a `list_users` row.
    fn user_from_row(&self, row: &Row) -> Option<(String, bool)>;

    fn create_schema(&self, schema: &str) -> Statement;
    fn drop_schema(&self, schema: &str) -> Statement;
    fn list_schemas(&self) -> Statement;
    fn schema_from_row(&self, row: &Row) -> Option<String>;

    fn grant(&self, permission: Permission, schema: &str, user: &str) -> Statement;
    fn revoke_all(&self, schema: &str, user: &str) -> Statement;
    fn list_permissions(&self, schema: &str, user: &str) -> Statement;
    fn permission_from_row(&self, row: &Row) -> Option<String>;
}

/// Cassandra Query Language.
#[derive(Debug, Clone, Copy, Default)]
pub struct CqlDialect;

impl Dialect for CqlDialect {
    fn create_user(&self, name: &str, password: &str) -> Statement {
        Statement::new("CREATE USER '{}' WITH PASSWORD ? NOSUPERUSER;")
            .ident(name)
            .bind(password)
    }

    fn drop_user(&self, name: &str) -> Statement {
        Statement::new("DROP USER '{}';").ident(name)
    }

    fn alter_user_password(&self, name: &str, password: &str) -> Statement {
        Statement::new("ALTER USER '{}' WITH PASSWORD ?;")
            .ident(name)
            .bind(password)
    }

    fn list_users(&self) -> Statement {
        Statement::new("LIST USERS;")
    }

    fn user_from_row(&self, row: &Row) -> Option<(String, bool)> {
        let name = row.text("name")?.to_string();
        Some((name, row.flag("super").unwrap_or(false)))
    }

    // Quoting keeps keyspace names case-sensitive.
    fn create_schema(&self, schema: &str) -> Statement {
        Statement::new(
            "CREATE KEYSPACE \"{}\" WITH REPLICATION = \
             {{ 'class' : 'SimpleStrategy', 'replication_factor' : 1 }};",
        )
        .ident(schema)
    }

    fn drop_schema(&self, schema: &str) -> Statement {
        Statement::new("DROP KEYSPACE \"{}\";").ident(schema)
    }

    fn list_schemas(&self) -> Statement {
        Statement::new("SELECT keyspace_name FROM system_schema.keyspaces;")
    }

    fn schema_from_row(&self, row: &Row) -> Option<String> {
        row.text("keyspace_name").map(str::to_string)
    }

    fn grant(&self, permission: Permission, schema: &str, user: &str) -> Statement {
        Statement::new("GRANT {} ON KEYSPACE \"{}\" TO '{}';")
            .ident(permission.as_str())
            .ident(schema)
            .ident(user)
    }

    fn revoke_all(&self, schema: &str, user: &str) -> Statement {
        Statement::new("REVOKE ALL PERMISSIONS ON KEYSPACE \"{}\" FROM '{}';")
            .ident(schema)
            .ident(user)
    }

    fn list_permissions(&self, schema: &str, user: &str) -> Statement {
        Statement::new("LIST ALL PERMISSIONS ON KEYSPACE \"{}\" OF '{}' NORECURSIVE;")
            .ident(schema)
            .ident(user)
    }

    fn permission_from_row(&self, row: &Row) -> Option<String> {
        row.text("permission").map(str::to_string)
    }
}

static CQL: CqlDialect = CqlDialect;

/// Backends compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datastore {
    #[default]
    Cassandra,
}

impl Datastore {
    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Datastore::Cassandra => &CQL,
        }
    }

    /// Superuser account the server ships with.
    pub fn default_superuser(&self) -> (&'static str, &'static str) {
        match self {
            Datastore::Cassandra => ("cassandra", "cassandra"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Cassandra => "cassandra",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datastore {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cassandra" => Ok(Datastore::Cassandra),
            other => Err(AgentError::Config(format!("unsupported datastore: {}", other))),
        }
    }
}
