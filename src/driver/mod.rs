//! Native driver contract
//!
//! The agent never speaks the database wire protocol itself. A [`Driver`] opens
//! a [`Connection`] to the administrative endpoint; the connection executes one
//! fully-rendered statement at a time with positional `?` values bound by the
//! driver. Everything above this module only sees rows and [`DriverError`].

pub mod cqlsh;

use crate::admin::models::AdminUser;
use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use cqlsh::CqlshDriver;

#[derive(Error, Debug)]
pub enum DriverError {
    /// None of the contact points accepted a connection.
    #[error("no host available: {0}")]
    NoHostAvailable(String),

    #[error("operation timed out: {0}")]
    OperationTimedOut(String),

    #[error("connection is shut down")]
    Shutdown,

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// Anything the server reported back, passed through verbatim.
    #[error("{0}")]
    Server(String),
}

/// A value bound through the driver's parameter mechanism, or read from a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
    Bool(bool),
    Null,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// One result row keyed by column name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        match self.columns.get(column) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Boolean column; text cells of `true`/`false` are accepted as well.
    pub fn flag(&self, column: &str) -> Option<bool> {
        match self.columns.get(column) {
            Some(Value::Bool(b)) => Some(*b),
            Some(Value::Text(s)) => s.parse::<bool>().ok(),
            _ => None,
        }
    }
}

/// Opens connections to the database's administrative endpoint.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn connect(
        &self,
        contact_points: &[String],
        credentials: &AdminUser,
    ) -> Result<Box<dyn Connection>, DriverError>;
}

/// A live driver connection. Statement timeouts are enforced by the caller.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn execute(&self, statement: &str, values: &[Value]) -> Result<Vec<Row>, DriverError>;

    fn is_shutdown(&self) -> bool;

    /// Release the connection. Calling it twice is harmless.
    fn shutdown(&mut self) -> Result<(), DriverError>;
}
