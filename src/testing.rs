//! In-memory stand-ins for the database server and OS collaborators.

use crate::admin::session::Connector;
use crate::admin::{AdminManager, AdminUser, Datastore};
use crate::config::AgentConfig;
use crate::driver::{Connection, Driver, DriverError, Row, Value};
use crate::error::{AgentError, Result};
use crate::service::{ConfigApplier, PackageManager, ProcessControl, ServiceStatus, StatusReporter};
use crate::superuser::SuperuserStore;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const SYSTEM_KEYSPACES: &[&str] = &[
    "system",
    "system_auth",
    "system_traces",
    "system_schema",
    "system_distributed",
];

#[derive(Debug)]
struct Account {
    password: String,
    superuser: bool,
}

#[derive(Debug)]
struct EngineState {
    users: BTreeMap<String, Account>,
    keyspaces: BTreeSet<String>,
    grants: BTreeMap<(String, String), BTreeSet<String>>,
    reachable: bool,
    latency: Duration,
    open_connections: usize,
    executed: Vec<String>,
}

/// A single-node server that understands the CQL dialect's statements.
#[derive(Clone)]
pub struct MemoryEngine {
    state: Arc<Mutex<EngineState>>,
    store: Arc<SuperuserStore>,
    _home: Arc<tempfile::TempDir>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        let (name, password) = Datastore::Cassandra.default_superuser();
        let mut users = BTreeMap::new();
        users.insert(
            name.to_string(),
            Account {
                password: password.to_string(),
                superuser: true,
            },
        );

        let home = tempfile::tempdir().expect("tempdir");
        let store = SuperuserStore::load(
            home.path().join("auth").join("credentials.toml"),
            AdminUser::new(name, password),
        )
        .expect("superuser store");

        Self {
            state: Arc::new(Mutex::new(EngineState {
                users,
                keyspaces: SYSTEM_KEYSPACES.iter().map(|s| s.to_string()).collect(),
                grants: BTreeMap::new(),
                reachable: true,
                latency: Duration::ZERO,
                open_connections: 0,
                executed: Vec::new(),
            })),
            store: Arc::new(store),
            _home: Arc::new(home),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().expect("engine state")
    }

    pub fn connector(&self) -> Connector {
        Connector::new(Arc::new(self.clone()), vec!["127.0.0.1".to_string()])
    }

    pub fn superuser(&self) -> AdminUser {
        self.store.current()
    }

    pub fn superuser_store(&self) -> Arc<SuperuserStore> {
        Arc::clone(&self.store)
    }

    /// Manager with the default ignore lists.
    pub fn admin_manager(&self) -> AdminManager {
        let defaults = AgentConfig::default();
        AdminManager::new(
            self.connector(),
            self.superuser_store(),
            Datastore::Cassandra.dialect(),
        )
        .ignore_users(defaults.ignore_users)
        .ignore_dbs(defaults.ignore_dbs)
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn is_reachable(&self) -> bool {
        self.lock().reachable
    }

    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    pub fn add_user(&self, name: &str, password: &str, superuser: bool) {
        self.lock().users.insert(
            name.to_string(),
            Account {
                password: password.to_string(),
                superuser,
            },
        );
    }

    pub fn add_keyspace(&self, name: &str) {
        self.lock().keyspaces.insert(name.to_string());
    }

    pub fn has_keyspace(&self, name: &str) -> bool {
        self.lock().keyspaces.contains(name)
    }

    pub fn is_superuser(&self, name: &str) -> Option<bool> {
        self.lock().users.get(name).map(|a| a.superuser)
    }

    pub fn password_of(&self, name: &str) -> Option<String> {
        self.lock().users.get(name).map(|a| a.password.clone())
    }

    pub fn grants_of(&self, user: &str, keyspace: &str) -> Vec<String> {
        self.lock()
            .grants
            .get(&(user.to_string(), keyspace.to_string()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Driver for MemoryEngine {
    async fn connect(
        &self,
        _contact_points: &[String],
        credentials: &AdminUser,
    ) -> std::result::Result<Box<dyn Connection>, DriverError> {
        let mut state = self.lock();
        if !state.reachable {
            return Err(DriverError::NoHostAvailable(
                "Unable to connect to any servers".to_string(),
            ));
        }
        match state.users.get(&credentials.name) {
            Some(account) if account.password == credentials.password => {}
            _ => {
                return Err(DriverError::Server(format!(
                    "AuthenticationFailed: Failed to authenticate as '{}'",
                    credentials.name
                )))
            }
        }
        state.open_connections += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryConnection {
    state: Arc<Mutex<EngineState>>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn release(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Ok(mut state) = self.state.lock() {
                state.open_connections -= 1;
            }
        }
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(
        &self,
        statement: &str,
        values: &[Value],
    ) -> std::result::Result<Vec<Row>, DriverError> {
        if self.is_shutdown() {
            return Err(DriverError::Shutdown);
        }
        let latency = self.state.lock().expect("engine state").latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().expect("engine state");
        if !state.reachable {
            return Err(DriverError::NoHostAvailable(
                "Unable to connect to any servers".to_string(),
            ));
        }
        state.executed.push(statement.to_string());
        interpret(&mut state, statement.trim(), values)
    }

    fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn shutdown(&mut self) -> std::result::Result<(), DriverError> {
        self.release();
        Ok(())
    }
}

fn interpret(
    state: &mut EngineState,
    statement: &str,
    values: &[Value],
) -> std::result::Result<Vec<Row>, DriverError> {
    let invalid = |message: String| -> std::result::Result<Vec<Row>, DriverError> {
        Err(DriverError::Server(format!("InvalidRequest: {}", message)))
    };

    if statement.starts_with("CREATE USER ") {
        let name = single_quoted(statement)?;
        if state.users.contains_key(&name) {
            return invalid(format!("{} already exists", name));
        }
        let password = text_value(values)?;
        state.users.insert(
            name,
            Account {
                password,
                superuser: !statement.contains("NOSUPERUSER"),
            },
        );
        Ok(Vec::new())
    } else if statement.starts_with("DROP USER ") {
        let name = single_quoted(statement)?;
        if state.users.remove(&name).is_none() {
            return invalid(format!("{} doesn't exist", name));
        }
        state.grants.retain(|(user, _), _| *user != name);
        Ok(Vec::new())
    } else if statement.starts_with("ALTER USER ") {
        let name = single_quoted(statement)?;
        let password = text_value(values)?;
        match state.users.get_mut(&name) {
            Some(account) => {
                account.password = password;
                Ok(Vec::new())
            }
            None => invalid(format!("{} doesn't exist", name)),
        }
    } else if statement == "LIST USERS;" {
        Ok(state
            .users
            .iter()
            .map(|(name, account)| {
                Row::new()
                    .with("name", name.as_str())
                    .with("super", account.superuser)
            })
            .collect())
    } else if statement.starts_with("CREATE KEYSPACE ") {
        let keyspace = double_quoted(statement)?;
        if !state.keyspaces.insert(keyspace.clone()) {
            return Err(DriverError::Server(format!(
                "AlreadyExists: Keyspace '{}' already exists",
                keyspace
            )));
        }
        Ok(Vec::new())
    } else if statement.starts_with("DROP KEYSPACE ") {
        let keyspace = double_quoted(statement)?;
        if !state.keyspaces.remove(&keyspace) {
            return invalid(format!("Keyspace '{}' doesn't exist", keyspace));
        }
        state.grants.retain(|(_, ks), _| *ks != keyspace);
        Ok(Vec::new())
    } else if statement == "SELECT keyspace_name FROM system_schema.keyspaces;" {
        Ok(state
            .keyspaces
            .iter()
            .map(|ks| Row::new().with("keyspace_name", ks.as_str()))
            .collect())
    } else if statement.starts_with("GRANT ") {
        let permission = statement
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string();
        let (keyspace, user) = resource_and_user(state, statement)?;
        state
            .grants
            .entry((user, keyspace))
            .or_default()
            .insert(permission);
        Ok(Vec::new())
    } else if statement.starts_with("REVOKE ALL PERMISSIONS ") {
        let (keyspace, user) = resource_and_user(state, statement)?;
        state.grants.remove(&(user, keyspace));
        Ok(Vec::new())
    } else if statement.starts_with("LIST ALL PERMISSIONS ") {
        let (keyspace, user) = resource_and_user(state, statement)?;
        Ok(state
            .grants
            .get(&(user.clone(), keyspace.clone()))
            .into_iter()
            .flatten()
            .map(|permission| {
                Row::new()
                    .with("role", user.as_str())
                    .with("resource", format!("<keyspace {}>", keyspace))
                    .with("permission", permission.as_str())
            })
            .collect())
    } else {
        Err(DriverError::Server(format!(
            "SyntaxException: line 1:0 no viable alternative at input '{}'",
            statement
        )))
    }
}

fn resource_and_user(
    state: &EngineState,
    statement: &str,
) -> std::result::Result<(String, String), DriverError> {
    let keyspace = double_quoted(statement)?;
    let user = single_quoted(statement)?;
    if !state.keyspaces.contains(&keyspace) {
        return Err(DriverError::Server(format!(
            "InvalidRequest: Resource <keyspace {}> doesn't exist",
            keyspace
        )));
    }
    if !state.users.contains_key(&user) {
        return Err(DriverError::Server(format!(
            "InvalidRequest: User {} doesn't exist",
            user
        )));
    }
    Ok((keyspace, user))
}

fn quoted(statement: &str, quote: char) -> std::result::Result<String, DriverError> {
    let mut parts = statement.split(quote);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(inner), Some(_)) => Ok(inner.to_string()),
        _ => Err(DriverError::Server(format!(
            "SyntaxException: missing quoted name in '{}'",
            statement
        ))),
    }
}

fn single_quoted(statement: &str) -> std::result::Result<String, DriverError> {
    quoted(statement, '\'')
}

fn double_quoted(statement: &str) -> std::result::Result<String, DriverError> {
    quoted(statement, '"')
}

fn text_value(values: &[Value]) -> std::result::Result<String, DriverError> {
    match values.first() {
        Some(Value::Text(s)) => Ok(s.clone()),
        _ => Err(DriverError::InvalidStatement(
            "expected one text value".to_string(),
        )),
    }
}

/// Process control that moves the engine up and down.
pub struct FakeProcessControl {
    engine: MemoryEngine,
    calls: Mutex<Vec<&'static str>>,
    start_brings_up: AtomicBool,
    stop_brings_down: AtomicBool,
    fail_start_command: AtomicBool,
    fail_init_storage: AtomicBool,
}

impl FakeProcessControl {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            engine,
            calls: Mutex::new(Vec::new()),
            start_brings_up: AtomicBool::new(true),
            stop_brings_down: AtomicBool::new(true),
            fail_start_command: AtomicBool::new(false),
            fail_init_storage: AtomicBool::new(false),
        }
    }

    /// The server never comes up after `start`.
    pub fn hang_on_start(&self) {
        self.start_brings_up.store(false, Ordering::SeqCst);
    }

    /// The server keeps running after `stop`.
    pub fn hang_on_stop(&self) {
        self.stop_brings_down.store(false, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.start_brings_up.store(true, Ordering::SeqCst);
        self.stop_brings_down.store(true, Ordering::SeqCst);
    }

    pub fn fail_start_command(&self) {
        self.fail_start_command.store(true, Ordering::SeqCst);
    }

    pub fn fail_init_storage(&self) {
        self.fail_init_storage.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().expect("calls").clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().expect("calls").push(call);
    }
}

fn process_error(command: &str) -> AgentError {
    AgentError::Process {
        command: command.to_string(),
        reason: "exit code Some(1)".to_string(),
    }
}

#[async_trait]
impl ProcessControl for FakeProcessControl {
    async fn start(&self) -> Result<()> {
        self.record("start");
        if self.start_brings_up.load(Ordering::SeqCst) {
            self.engine.set_reachable(true);
        }
        if self.fail_start_command.load(Ordering::SeqCst) {
            return Err(process_error("start"));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop");
        if self.stop_brings_down.load(Ordering::SeqCst) {
            self.engine.set_reachable(false);
        }
        Ok(())
    }

    async fn kill(&self) -> Result<()> {
        self.record("kill");
        self.engine.set_reachable(false);
        Ok(())
    }

    async fn enable_on_boot(&self) -> Result<()> {
        self.record("enable_on_boot");
        Ok(())
    }

    async fn disable_on_boot(&self) -> Result<()> {
        self.record("disable_on_boot");
        Ok(())
    }

    async fn init_storage(&self, _mount_point: &Path) -> Result<()> {
        self.record("init_storage");
        if self.fail_init_storage.load(Ordering::SeqCst) {
            return Err(process_error("init_storage"));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePackages {
    installed: AtomicBool,
    installs: Mutex<Vec<Vec<String>>>,
}

impl FakePackages {
    pub fn installed() -> Self {
        let packages = Self::default();
        packages.installed.store(true, Ordering::SeqCst);
        packages
    }

    pub fn installs(&self) -> Vec<Vec<String>> {
        self.installs.lock().expect("installs").clone()
    }
}

#[async_trait]
impl PackageManager for FakePackages {
    async fn is_installed(&self, _packages: &[String]) -> Result<bool> {
        Ok(self.installed.load(Ordering::SeqCst))
    }

    async fn install(&self, packages: &[String], _timeout: Duration) -> Result<()> {
        self.installs.lock().expect("installs").push(packages.to_vec());
        self.installed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeConfigApplier {
    applied: Mutex<Vec<String>>,
}

impl FakeConfigApplier {
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().expect("applied").clone()
    }
}

#[async_trait]
impl ConfigApplier for FakeConfigApplier {
    async fn apply(&self, contents: &str) -> Result<()> {
        self.applied.lock().expect("applied").push(contents.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    reported: Mutex<Vec<ServiceStatus>>,
}

impl RecordingReporter {
    pub fn reported(&self) -> Vec<ServiceStatus> {
        self.reported.lock().expect("reported").clone()
    }
}

impl StatusReporter for RecordingReporter {
    fn report(&self, status: ServiceStatus) {
        self.reported.lock().expect("reported").push(status);
    }
}
