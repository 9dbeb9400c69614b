//! Driver adapter backed by the `cqlsh` client binary.
//!
//! Each statement runs as one `cqlsh -e` invocation against the first contact
//! point that answered during `connect`. Credentials travel through a private
//! cqlshrc temp file (mode 0600) instead of the command line, and the file is
//! removed when the connection shuts down.

use super::{Connection, Driver, DriverError, Row, Value};
use crate::admin::models::AdminUser;
use async_trait::async_trait;
use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, trace, warn};

const PROBE_STATEMENT: &str = "SELECT release_version FROM system.local;";

const UNREACHABLE_MARKERS: &[&str] = &[
    "Unable to connect to any servers",
    "Connection refused",
    "NoHostAvailable",
];

const TIMEOUT_MARKERS: &[&str] = &["OperationTimedOut", "ReadTimeout", "WriteTimeout"];

pub struct CqlshDriver {
    binary: String,
    port: u16,
}

impl CqlshDriver {
    pub fn new(binary: impl Into<String>, port: u16) -> Self {
        Self {
            binary: binary.into(),
            port,
        }
    }
}

#[async_trait]
impl Driver for CqlshDriver {
    async fn connect(
        &self,
        contact_points: &[String],
        credentials: &AdminUser,
    ) -> Result<Box<dyn Connection>, DriverError> {
        let rc = write_cqlshrc(credentials)
            .map_err(|e| DriverError::Server(format!("failed to write cqlshrc: {}", e)))?;

        let mut failures = Vec::new();
        for host in contact_points {
            let connection = CqlshConnection {
                binary: self.binary.clone(),
                host: host.clone(),
                port: self.port,
                rc: None,
                shutdown: AtomicBool::new(false),
            };

            match connection.run(PROBE_STATEMENT, rc.path()).await {
                Ok(_) => {
                    debug!("Connected to {}:{} as '{}'", host, self.port, credentials.name);
                    return Ok(Box::new(CqlshConnection {
                        rc: Some(rc),
                        ..connection
                    }));
                }
                Err(DriverError::NoHostAvailable(reason)) => {
                    trace!("Contact point {} unreachable: {}", host, reason);
                    failures.push(format!("{}: {}", host, reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(DriverError::NoHostAvailable(failures.join("; ")))
    }
}

struct CqlshConnection {
    binary: String,
    host: String,
    port: u16,
    rc: Option<NamedTempFile>,
    shutdown: AtomicBool,
}

impl CqlshConnection {
    async fn run(&self, statement: &str, rc_path: &Path) -> Result<Vec<Row>, DriverError> {
        let output = Command::new(&self.binary)
            .arg("--cqlshrc")
            .arg(rc_path)
            .arg(&self.host)
            .arg(self.port.to_string())
            .arg("-e")
            .arg(statement)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| DriverError::NoHostAvailable(format!("failed to run {}: {}", self.binary, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            if !stderr.trim().is_empty() {
                debug!("cqlsh on {} reported: {}", self.host, stderr.trim());
            }
            return Ok(parse_table(&stdout));
        }

        Err(classify_failure(&format!("{}{}", stderr, stdout)))
    }
}

#[async_trait]
impl Connection for CqlshConnection {
    async fn execute(&self, statement: &str, values: &[Value]) -> Result<Vec<Row>, DriverError> {
        let Some(rc) = self.rc.as_ref() else {
            return Err(DriverError::Shutdown);
        };
        if self.is_shutdown() {
            return Err(DriverError::Shutdown);
        }

        let rendered = bind_values(statement, values)?;
        self.run(&rendered, rc.path()).await
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(rc) = self.rc.take() {
            rc.close()
                .map_err(|e| DriverError::Server(format!("failed to remove cqlshrc: {}", e)))?;
        }
        Ok(())
    }
}

fn write_cqlshrc(credentials: &AdminUser) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("dbagent-cqlshrc").tempfile()?;
    writeln!(file, "[authentication]")?;
    writeln!(file, "username = {}", credentials.name)?;
    writeln!(file, "password = {}", credentials.password)?;
    file.flush()?;
    Ok(file)
}

fn classify_failure(message: &str) -> DriverError {
    let message = message.trim().to_string();
    if UNREACHABLE_MARKERS.iter().any(|m| message.contains(m)) {
        DriverError::NoHostAvailable(message)
    } else if TIMEOUT_MARKERS.iter().any(|m| message.contains(m)) {
        DriverError::OperationTimedOut(message)
    } else {
        if message.is_empty() {
            warn!("cqlsh failed without output");
        }
        DriverError::Server(message)
    }
}

/// Replace each `?` outside quoted sections with the next value as a CQL literal.
fn bind_values(statement: &str, values: &[Value]) -> Result<String, DriverError> {
    let mut rendered = String::with_capacity(statement.len());
    let mut remaining = values.iter();
    let mut in_single = false;
    let mut in_double = false;

    for ch in statement.chars() {
        match ch {
            '\'' if !in_double => {
                in_single = !in_single;
                rendered.push(ch);
            }
            '"' if !in_single => {
                in_double = !in_double;
                rendered.push(ch);
            }
            '?' if !in_single && !in_double => {
                let value = remaining.next().ok_or_else(|| {
                    DriverError::InvalidStatement(format!(
                        "more placeholders than the {} bound values",
                        values.len()
                    ))
                })?;
                rendered.push_str(&literal(value));
            }
            _ => rendered.push(ch),
        }
    }

    if remaining.next().is_some() {
        return Err(DriverError::InvalidStatement(format!(
            "{} bound values but fewer placeholders",
            values.len()
        )));
    }
    Ok(rendered)
}

fn literal(value: &Value) -> String {
    match value {
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
    }
}

/// Parse cqlsh's tabular output. Statements without a result set yield no rows.
fn parse_table(output: &str) -> Vec<Row> {
    let lines: Vec<&str> = output.lines().collect();
    let Some(header_idx) = lines.windows(2).position(|pair| is_separator(pair[1])) else {
        return Vec::new();
    };

    let columns: Vec<String> = lines[header_idx]
        .split('|')
        .map(|c| c.trim().to_string())
        .collect();

    lines[header_idx + 2..]
        .iter()
        .take_while(|line| !line.trim().is_empty() && !line.trim_start().starts_with('('))
        .map(|line| {
            let mut row = Row::new();
            for (column, cell) in columns.iter().zip(line.split('|')) {
                row.insert(column.clone(), cell_value(cell.trim()));
            }
            row
        })
        .collect()
}

fn is_separator(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && line.contains('-') && line.chars().all(|c| c == '-' || c == '+')
}

fn cell_value(cell: &str) -> Value {
    match cell {
        "True" => Value::Bool(true),
        "False" => Value::Bool(false),
        "null" => Value::Null,
        other => Value::Text(other.to_string()),
    }
}
