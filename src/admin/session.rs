//! Administrative session: one driver connection with an explicit open/closed
//! lifecycle.
//!
//! Sessions are scoped resources. Dropping an [`AdminSession`] closes it, so a
//! session acquired inside an operation is released on every exit path,
//! including early `?` returns and a cancelled future.

use super::dialect::Statement;
use super::models::AdminUser;
use crate::driver::{Connection, Driver, DriverError, Row, Value};
use crate::error::{AgentError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

/// Opens sessions against the local node's contact points.
#[derive(Clone)]
pub struct Connector {
    driver: Arc<dyn Driver>,
    contact_points: Vec<String>,
    statement_timeout: Option<Duration>,
}

impl Connector {
    pub fn new(driver: Arc<dyn Driver>, contact_points: Vec<String>) -> Self {
        Self {
            driver,
            contact_points,
            statement_timeout: None,
        }
    }

    /// Default timeout for statements run through [`AdminSession::run`].
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn session(&self, credentials: AdminUser) -> AdminSession {
        AdminSession {
            driver: Arc::clone(&self.driver),
            contact_points: self.contact_points.clone(),
            credentials,
            statement_timeout: self.statement_timeout,
            connection: None,
            terminated: false,
        }
    }

    /// Create and open a session in one step.
    pub async fn open(&self, credentials: &AdminUser) -> Result<AdminSession> {
        let mut session = self.session(credentials.clone());
        session.open().await?;
        Ok(session)
    }
}

pub struct AdminSession {
    driver: Arc<dyn Driver>,
    contact_points: Vec<String>,
    credentials: AdminUser,
    statement_timeout: Option<Duration>,
    connection: Option<Box<dyn Connection>>,
    /// Set once closed; a closed session is never reopened.
    terminated: bool,
}

impl AdminSession {
    pub async fn open(&mut self) -> Result<()> {
        if self.terminated {
            debug!("Cannot open a session that has already been closed");
            return Err(AgentError::PreconditionViolated(
                "session has been closed".to_string(),
            ));
        }
        if self.is_open() {
            debug!("Session already open");
            return Ok(());
        }

        debug!("Connecting to the database as '{}'", self.credentials.name);
        match self
            .driver
            .connect(&self.contact_points, &self.credentials)
            .await
        {
            Ok(connection) => {
                debug!("Connected to contact points {:?}", self.contact_points);
                self.connection = Some(connection);
                Ok(())
            }
            Err(DriverError::NoHostAvailable(reason)) => Err(AgentError::SessionUnavailable(reason)),
            Err(e) => {
                debug!("Connection as '{}' refused: {}", self.credentials.name, e);
                Err(AgentError::SessionUnavailable(e.to_string()))
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection
            .as_ref()
            .map(|c| !c.is_shutdown())
            .unwrap_or(false)
    }

    /// Execute a statement template.
    ///
    /// `identifiers` replace the `{}` placeholders verbatim; `values` are bound
    /// by the driver. No reconnect is attempted on a closed session and a
    /// timed-out statement is not retried.
    pub async fn execute(
        &self,
        template: &str,
        identifiers: &[String],
        values: &[Value],
        timeout: Option<Duration>,
    ) -> Result<Vec<Row>> {
        let connection = match self.connection.as_ref() {
            Some(c) if !c.is_shutdown() => c,
            _ => {
                debug!("Cannot perform this operation on a closed connection");
                return Err(AgentError::PreconditionViolated(
                    "session is not open".to_string(),
                ));
            }
        };

        let statement = bind_identifiers(template, identifiers)?;
        trace!(statement = %statement, values = values.len(), "Executing statement");

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, connection.execute(&statement, values))
                .await
                .map_err(|_| {
                    error!("Query execution timed out after {:?}", limit);
                    AgentError::Timeout(format!("no response within {:?}", limit))
                })?,
            None => connection.execute(&statement, values).await,
        };

        outcome.map_err(|e| match e {
            DriverError::OperationTimedOut(reason) => {
                error!("Query execution timed out");
                AgentError::Timeout(reason)
            }
            DriverError::Shutdown => {
                AgentError::PreconditionViolated("connection has been shut down".to_string())
            }
            other => AgentError::Driver(other),
        })
    }

    /// Execute a dialect statement with the session's default timeout.
    pub async fn run(&self, statement: &Statement) -> Result<Vec<Row>> {
        self.execute(
            statement.template,
            &statement.identifiers,
            &statement.values,
            self.statement_timeout,
        )
        .await
    }

    /// Best-effort teardown; failures are logged and swallowed.
    pub fn close(&mut self) {
        self.terminated = true;
        if let Some(mut connection) = self.connection.take() {
            debug!("Disconnecting session of '{}'", self.credentials.name);
            if let Err(e) = connection.shutdown() {
                debug!("Failed to disconnect cleanly: {}", e);
            }
        }
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Substitute `{}` placeholders in order; `{{` and `}}` yield literal braces.
pub(crate) fn bind_identifiers(template: &str, identifiers: &[String]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut remaining = identifiers.iter();
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match (ch, chars.peek()) {
            ('{', Some('{')) => {
                chars.next();
                out.push('{');
            }
            ('}', Some('}')) => {
                chars.next();
                out.push('}');
            }
            ('{', Some('}')) => {
                chars.next();
                let identifier = remaining.next().ok_or_else(|| {
                    AgentError::InvalidRequest(format!(
                        "statement needs more than {} identifiers",
                        identifiers.len()
                    ))
                })?;
                out.push_str(identifier);
            }
            ('{', _) | ('}', _) => {
                return Err(AgentError::InvalidRequest(format!(
                    "unbalanced brace in statement template: {}",
                    template
                )));
            }
            _ => out.push(ch),
        }
    }

    if remaining.next().is_some() {
        return Err(AgentError::InvalidRequest(format!(
            "statement takes fewer than {} identifiers",
            identifiers.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::MemoryEngine;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bind_identifiers() {
        let out = bind_identifiers("GRANT {} ON KEYSPACE \"{}\" TO '{}';", &ids(&["SELECT", "Orders", "alice"]))
            .unwrap();
        assert_eq!(out, "GRANT SELECT ON KEYSPACE \"Orders\" TO 'alice';");

        let out = bind_identifiers("WITH {{ 'k' : 1 }} \"{}\"", &ids(&["ks"])).unwrap();
        assert_eq!(out, "WITH { 'k' : 1 } \"ks\"");
    }

    #[test]
    fn test_bind_identifiers_count_mismatch() {
        assert!(bind_identifiers("DROP USER '{}';", &[]).is_err());
        assert!(bind_identifiers("LIST USERS;", &ids(&["extra"])).is_err());
        assert!(bind_identifiers("broken { brace", &[]).is_err());
    }

    #[tokio::test]
    async fn test_execute_on_unopened_session_fails() {
        let engine = MemoryEngine::new();
        let session = engine.connector().session(engine.superuser());

        let err = session.execute("LIST USERS;", &[], &[], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionViolated);
    }

    #[tokio::test]
    async fn test_open_is_idempotent_and_close_is_final() {
        let engine = MemoryEngine::new();
        let mut session = engine.connector().session(engine.superuser());

        session.open().await.unwrap();
        session.open().await.unwrap();
        assert!(session.is_open());
        assert_eq!(engine.open_connections(), 1);

        session.close();
        session.close();
        assert!(!session.is_open());
        assert_eq!(engine.open_connections(), 0);

        let err = session.execute("LIST USERS;", &[], &[], None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionViolated);
        assert_eq!(session.open().await.unwrap_err().kind(), ErrorKind::PreconditionViolated);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_session_unavailable() {
        let engine = MemoryEngine::new();
        engine.set_reachable(false);

        let err = engine.connector().open(&engine.superuser()).await.err().unwrap();
        assert!(matches!(err, AgentError::SessionUnavailable(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_session_unavailable() {
        let engine = MemoryEngine::new();

        let err = engine
            .connector()
            .open(&AdminUser::new("cassandra", "wrong"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AgentError::SessionUnavailable(_)));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("AuthenticationFailed"));
        assert_eq!(engine.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_connection() {
        let engine = MemoryEngine::new();
        {
            let _session = engine.connector().open(&engine.superuser()).await.unwrap();
            assert_eq!(engine.open_connections(), 1);
        }
        assert_eq!(engine.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_statement_timeout_propagates() {
        let engine = MemoryEngine::new();
        engine.set_latency(Duration::from_millis(200));
        let session = engine.connector().open(&engine.superuser()).await.unwrap();

        let err = session
            .execute("LIST USERS;", &[], &[], Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_engine_errors_surface_unmodified() {
        let engine = MemoryEngine::new();
        let session = engine.connector().open(&engine.superuser()).await.unwrap();

        let err = session
            .execute("DROP USER '{}';", &ids(&["ghost"]), &[], None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert!(err.to_string().contains("ghost"));
    }
}
