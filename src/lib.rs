pub mod admin;
pub mod agent;
pub mod clienv;
pub mod config;
pub mod driver;
pub mod error;
pub mod protocol;
pub mod service;
pub mod superuser;

#[cfg(test)]
mod testing;

pub use agent::GuestAgent;
pub use config::AgentConfig;
pub use error::{AgentError, ErrorKind, Result};
pub use protocol::{Request, Response};
