//! User, keyspace and permission administration.
//!
//! Only superusers can create accounts and grant permissions, so every call
//! here opens its own session as the agent's superuser and closes it before
//! returning. Accounts created here are always `NOSUPERUSER`, grants are
//! limited to [`Permission::NON_SUPERUSER`], and listings never include
//! superuser accounts or names on the ignore lists. That keeps the
//! orchestrator API from being usable to mint a new superuser.

use super::dialect::Dialect;
use super::models::{AdminUser, DatabaseUser, Permission, Schema, UserAttributes};
use super::session::{AdminSession, Connector};
use crate::error::{AgentError, Result};
use crate::superuser::SuperuserStore;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct AdminManager {
    connector: Connector,
    superuser: Arc<SuperuserStore>,
    dialect: &'static dyn Dialect,
    ignore_users: BTreeSet<String>,
    ignore_dbs: BTreeSet<String>,
}

impl AdminManager {
    pub fn new(
        connector: Connector,
        superuser: Arc<SuperuserStore>,
        dialect: &'static dyn Dialect,
    ) -> Self {
        Self {
            connector,
            superuser,
            dialect,
            ignore_users: BTreeSet::new(),
            ignore_dbs: BTreeSet::new(),
        }
    }

    pub fn ignore_users<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_users = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn ignore_dbs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_dbs = names.into_iter().map(Into::into).collect();
        self
    }

    async fn session(&self) -> Result<AdminSession> {
        self.connector.open(&self.superuser.current()).await
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Create non-superuser accounts with full access to their listed keyspaces.
    ///
    /// Entries are processed independently; the first failure is returned after
    /// the remaining entries have been attempted.
    pub async fn create_users(&self, users: &[DatabaseUser]) -> Result<()> {
        let session = self.session().await?;
        let mut first_error = None;
        for user in users {
            if let Err(e) = self.create_user_and_grant(&session, user).await {
                warn!("Failed to create user '{}': {}", user.name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn create_user_and_grant(&self, session: &AdminSession, user: &DatabaseUser) -> Result<()> {
        if self.ignore_users.contains(&user.name) {
            return Err(AgentError::InvalidRequest(format!(
                "user name '{}' is reserved",
                user.name
            )));
        }
        let password = user.required_password()?;

        debug!("Creating a new user '{}'", user.name);
        session
            .run(&self.dialect.create_user(&user.name, password))
            .await?;

        for schema in &user.databases {
            self.grant_full_access(session, schema, &user.name).await?;
        }
        Ok(())
    }

    pub async fn delete_user(&self, name: &str) -> Result<()> {
        let session = self.session().await?;
        self.find_user(&session, name).await?;
        self.drop_user(&session, name).await
    }

    async fn drop_user(&self, session: &AdminSession, name: &str) -> Result<()> {
        debug!("Deleting user '{}'", name);
        session.run(&self.dialect.drop_user(name)).await?;
        Ok(())
    }

    pub async fn get_user(&self, name: &str) -> Result<DatabaseUser> {
        let session = self.session().await?;
        self.find_user(&session, name).await
    }

    /// All visible accounts, each with the keyspaces it holds permissions on.
    pub async fn list_users(&self) -> Result<Vec<DatabaseUser>> {
        let session = self.session().await?;
        let schemas = self.available_schemas(&session).await?;

        let mut users = Vec::new();
        for name in self.visible_user_names(&session).await? {
            users.push(self.build_user(&session, &name, &schemas).await?);
        }
        Ok(users)
    }

    pub async fn list_access(&self, name: &str) -> Result<Vec<Schema>> {
        let session = self.session().await?;
        let user = self.find_user(&session, name).await?;
        Ok(user.databases.into_iter().collect())
    }

    /// Look a user up among the visible accounts and resolve its grants.
    async fn find_user(&self, session: &AdminSession, name: &str) -> Result<DatabaseUser> {
        if !self.visible_user_names(session).await?.contains(name) {
            return Err(AgentError::user_not_found(name));
        }
        let schemas = self.available_schemas(session).await?;
        self.build_user(session, name, &schemas).await
    }

    async fn visible_user_names(&self, session: &AdminSession) -> Result<BTreeSet<String>> {
        let rows = session.run(&self.dialect.list_users()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| self.dialect.user_from_row(row))
            .filter(|(name, is_super)| !is_super && !self.ignore_users.contains(name))
            .map(|(name, _)| name)
            .collect())
    }

    /// Probes every keyspace for the user's permissions.
    async fn build_user(
        &self,
        session: &AdminSession,
        name: &str,
        schemas: &BTreeSet<Schema>,
    ) -> Result<DatabaseUser> {
        let mut user = DatabaseUser::new(name);
        for schema in schemas {
            let rows = session
                .run(&self.dialect.list_permissions(&schema.name, name))
                .await?;
            if rows
                .iter()
                .any(|row| self.dialect.permission_from_row(row).is_some())
            {
                user.databases.insert(schema.clone());
            }
        }
        Ok(user)
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    /// Grant the full non-superuser permission set on each keyspace.
    pub async fn grant_access(&self, username: &str, databases: &[String]) -> Result<()> {
        let session = self.session().await?;
        self.find_user(&session, username).await?;
        for db in databases {
            let schema = self.visible_schema(db)?;
            self.grant_full_access(&session, &schema, username).await?;
        }
        Ok(())
    }

    /// Grant a single modifier. Anything outside the non-superuser set is
    /// rejected before a session is opened.
    pub async fn grant_permission(&self, username: &str, database: &str, modifier: &str) -> Result<()> {
        let permission: Permission = modifier.parse()?;
        let schema = self.visible_schema(database)?;

        let session = self.session().await?;
        self.find_user(&session, username).await?;
        self.grant(&session, permission, &schema, username).await
    }

    pub async fn revoke_access(&self, username: &str, database: &str) -> Result<()> {
        let schema = self.visible_schema(database)?;
        let session = self.session().await?;
        self.find_user(&session, username).await?;
        let schema = self.existing_schema(&session, schema).await?;

        debug!(
            "Revoking all permissions on '{}' from user '{}'",
            schema.name, username
        );
        session
            .run(&self.dialect.revoke_all(&schema.name, username))
            .await?;
        Ok(())
    }

    async fn grant_full_access(&self, session: &AdminSession, schema: &Schema, username: &str) -> Result<()> {
        for permission in Permission::NON_SUPERUSER {
            self.grant(session, permission, schema, username).await?;
        }
        Ok(())
    }

    async fn grant(
        &self,
        session: &AdminSession,
        permission: Permission,
        schema: &Schema,
        username: &str,
    ) -> Result<()> {
        debug!(
            "Granting '{}' access on '{}' to user '{}'",
            permission, schema.name, username
        );
        session
            .run(&self.dialect.grant(permission, &schema.name, username))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attributes and passwords
    // ------------------------------------------------------------------

    /// Rename and/or change the password of a user.
    ///
    /// A rename creates the new account with every grant the old one held and
    /// then drops the old account. The stored password cannot be read back, so
    /// a rename must carry the password for the new account.
    pub async fn update_attributes(&self, username: &str, attrs: &UserAttributes) -> Result<()> {
        let session = self.session().await?;
        let user = self.find_user(&session, username).await?;

        match (&attrs.name, &attrs.password) {
            (Some(new_name), password) if *new_name != user.name => {
                let password = password.as_deref().ok_or_else(|| {
                    AgentError::InvalidRequest(format!(
                        "renaming '{}' requires a password for the new account",
                        user.name
                    ))
                })?;
                self.rename_user(&session, &user, new_name, password).await
            }
            (_, Some(password)) => self.alter_password(&session, &user.name, password).await,
            _ => {
                debug!("No attribute changes for user '{}'", user.name);
                Ok(())
            }
        }
    }

    async fn rename_user(
        &self,
        session: &AdminSession,
        user: &DatabaseUser,
        new_name: &str,
        password: &str,
    ) -> Result<()> {
        info!("Renaming user '{}' to '{}'", user.name, new_name);
        if self.ignore_users.contains(new_name) {
            return Err(AgentError::InvalidRequest(format!(
                "user name '{}' is reserved",
                new_name
            )));
        }
        session
            .run(&self.dialect.create_user(new_name, password))
            .await?;

        for schema in &user.databases {
            if let Err(e) = self.grant_full_access(session, schema, new_name).await {
                warn!("Grant transfer to '{}' failed, dropping it: {}", new_name, e);
                if let Err(cleanup) = self.drop_user(session, new_name).await {
                    warn!("Failed to drop partially created user '{}': {}", new_name, cleanup);
                }
                return Err(e);
            }
        }

        self.drop_user(session, &user.name).await
    }

    /// Change the password of any account, superusers included. Used when
    /// rotating the agent's own credentials.
    pub async fn alter_user_password(&self, user: &AdminUser) -> Result<()> {
        let session = self.session().await?;
        self.alter_password(&session, &user.name, &user.password).await
    }

    pub async fn change_passwords(&self, users: &[DatabaseUser]) -> Result<()> {
        let session = self.session().await?;
        let mut first_error = None;
        for user in users {
            let result = match user.required_password() {
                Ok(password) => self.alter_password(&session, &user.name, password).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to change password of '{}': {}", user.name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn alter_password(&self, session: &AdminSession, name: &str, password: &str) -> Result<()> {
        debug!("Changing password of user '{}'", name);
        session
            .run(&self.dialect.alter_user_password(name, password))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Keyspaces
    // ------------------------------------------------------------------

    /// Create single-replica keyspaces. Entries are processed independently.
    pub async fn create_databases(&self, databases: &[Schema]) -> Result<()> {
        let session = self.session().await?;
        let mut first_error = None;
        for schema in databases {
            let result = if self.ignore_dbs.contains(&schema.name) {
                Err(AgentError::InvalidRequest(format!(
                    "database name '{}' is reserved",
                    schema.name
                )))
            } else {
                debug!("Creating keyspace '{}'", schema.name);
                session
                    .run(&self.dialect.create_schema(&schema.name))
                    .await
                    .map(|_| ())
            };
            if let Err(e) = result {
                warn!("Failed to create keyspace '{}': {}", schema.name, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn delete_database(&self, database: &Schema) -> Result<()> {
        let schema = self.visible_schema(&database.name)?;
        let session = self.session().await?;
        let schema = self.existing_schema(&session, schema).await?;
        debug!("Dropping keyspace '{}'", schema.name);
        session.run(&self.dialect.drop_schema(&schema.name)).await?;
        Ok(())
    }

    pub async fn list_databases(&self) -> Result<Vec<Schema>> {
        let session = self.session().await?;
        Ok(self.available_schemas(&session).await?.into_iter().collect())
    }

    async fn available_schemas(&self, session: &AdminSession) -> Result<BTreeSet<Schema>> {
        let rows = session.run(&self.dialect.list_schemas()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| self.dialect.schema_from_row(row))
            .filter(|name| !self.ignore_dbs.contains(name))
            .map(Schema::new)
            .collect())
    }

    async fn existing_schema(&self, session: &AdminSession, schema: Schema) -> Result<Schema> {
        if self.available_schemas(session).await?.contains(&schema) {
            Ok(schema)
        } else {
            Err(AgentError::schema_not_found(schema.name))
        }
    }

    /// Reference a keyspace by name; reserved keyspaces are invisible.
    fn visible_schema(&self, name: &str) -> Result<Schema> {
        if self.ignore_dbs.contains(name) {
            return Err(AgentError::schema_not_found(name));
        }
        Ok(Schema::new(name))
    }
}
