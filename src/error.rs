use crate::driver::DriverError;
use crate::service::ServiceStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("{operation} did not reach {target} within {timeout_secs}s")]
    FatalTransition {
        operation: &'static str,
        target: ServiceStatus,
        timeout_secs: u64,
    },

    #[error("precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid permission modifier ({modifier}); allowed values are: {allowed}")]
    InvalidPermission { modifier: String, allowed: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("statement timed out: {0}")]
    Timeout(String),

    #[error("command `{command}` failed: {reason}")]
    Process { command: String, reason: String },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification callers use to decide fatality and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FatalTransition,
    PreconditionViolated,
    NotFound,
    InvalidRequest,
    Transport,
    Unexpected,
}

impl AgentError {
    pub fn user_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "user",
            name: name.into(),
        }
    }

    pub fn schema_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "database",
            name: name.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FatalTransition { .. } => ErrorKind::FatalTransition,
            Self::PreconditionViolated(_) => ErrorKind::PreconditionViolated,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidPermission { .. } | Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::SessionUnavailable(_) | Self::Timeout(_) => ErrorKind::Transport,
            Self::Driver(DriverError::NoHostAvailable(_))
            | Self::Driver(DriverError::OperationTimedOut(_)) => ErrorKind::Transport,
            Self::Driver(_)
            | Self::Process { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => ErrorKind::Unexpected,
        }
    }

    /// Only transport failures are worth retrying from the caller's side.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
