//! Database administration over an authenticated superuser session.

pub mod dialect;
pub mod manager;
pub mod models;
pub mod session;

pub use dialect::{CqlDialect, Datastore, Dialect, Statement};
pub use manager::AdminManager;
pub use models::{AdminUser, DatabaseUser, Permission, Schema, UserAttributes};
pub use session::{AdminSession, Connector};
