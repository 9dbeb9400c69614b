use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Credential used to open administrative sessions.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub name: String,
    pub password: String,
}

impl AdminUser {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for AdminUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminUser")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A keyspace reference. Names are case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Schema {
    pub name: String,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A non-superuser database account and the keyspaces it can access.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseUser {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub databases: BTreeSet<Schema>,
    /// Always false for accounts managed here.
    #[serde(default)]
    pub superuser: bool,
}

impl DatabaseUser {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: None,
            databases: BTreeSet::new(),
            superuser: false,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_databases<I, S>(mut self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases.extend(databases.into_iter().map(Schema::new));
        self
    }

    pub(crate) fn required_password(&self) -> Result<&str, AgentError> {
        self.password.as_deref().ok_or_else(|| {
            AgentError::InvalidRequest(format!("user '{}' requires a password", self.name))
        })
    }
}

impl fmt::Debug for DatabaseUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseUser")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("databases", &self.databases)
            .field("superuser", &self.superuser)
            .finish()
    }
}

/// Updatable attributes for `update_attributes`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for UserAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAttributes")
            .field("name", &self.name)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The only modifiers this agent will ever grant. There is deliberately no
/// variant for superuser-equivalent rights such as `AUTHORIZE` or `ALL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Alter,
    Create,
    Drop,
    Modify,
    Select,
}

impl Permission {
    pub const NON_SUPERUSER: [Permission; 5] = [
        Permission::Alter,
        Permission::Create,
        Permission::Drop,
        Permission::Modify,
        Permission::Select,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Alter => "ALTER",
            Permission::Create => "CREATE",
            Permission::Drop => "DROP",
            Permission::Modify => "MODIFY",
            Permission::Select => "SELECT",
        }
    }

    fn allowed_list() -> String {
        Self::NON_SUPERUSER
            .iter()
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NON_SUPERUSER
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgentError::InvalidPermission {
                modifier: s.to_string(),
                allowed: Self::allowed_list(),
            })
    }
}
