use crate::error::{AgentError, Result};
use std::io::Read;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::{debug, info};

const INPUT_CHUNK: usize = 64 * 1024;

/// Runs OS commands with a bounded timeout, either directly or through `sudo`.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    /// Target account for privileged commands (`sudo -u <user>`); root when unset.
    sudo_user: Option<String>,
    sudo_program: String,
    default_timeout: Duration,
}

impl CommandExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            sudo_user: None,
            sudo_program: "sudo".to_string(),
            default_timeout,
        }
    }

    pub fn with_sudo_user(mut self, user: Option<String>) -> Self {
        self.sudo_user = user;
        self
    }

    pub fn with_sudo_program(mut self, program: impl Into<String>) -> Self {
        self.sudo_program = program.into();
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Runs with the agent's own privileges.
    pub async fn run(&self, argv: &[String], timeout: Option<Duration>) -> Result<Output> {
        let (program, args) = split_argv(argv)?;
        debug!("Running command: {} {:?}", program, args);

        let mut cmd = Command::new(program);
        cmd.args(args).stdin(Stdio::null());
        self.execute(cmd, argv, timeout).await
    }

    /// Runs with root privileges (NOPASSWD sudo).
    pub async fn sudo_run(&self, argv: &[String], timeout: Option<Duration>) -> Result<Output> {
        let mut cmd = self.privileged(argv)?;
        cmd.stdin(Stdio::null());
        self.execute(cmd, argv, timeout).await
    }

    /// Like [`sudo_run`](Self::sudo_run), with `input` streamed to the command's stdin.
    pub async fn sudo_run_with_input<R>(
        &self,
        argv: &[String],
        input: R,
        timeout: Option<Duration>,
    ) -> Result<Output>
    where
        R: Read + Send + 'static,
    {
        let mut cmd = self.privileged(argv)?;
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let limit = timeout.unwrap_or(self.default_timeout);
        let rendered = argv.join(" ");

        let mut child = cmd.spawn().map_err(|e| AgentError::Process {
            command: rendered.clone(),
            reason: e.to_string(),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| AgentError::Process {
            command: rendered.clone(),
            reason: "stdin was not captured".to_string(),
        })?;

        let (fed, output) = tokio::time::timeout(
            limit,
            async { tokio::join!(feed_stdin(input, stdin), child.wait_with_output()) },
        )
        .await
        .map_err(|_| AgentError::Process {
            command: rendered.clone(),
            reason: format!("timed out after {:?}", limit),
        })?;

        let output = output.map_err(|e| AgentError::Process {
            command: rendered.clone(),
            reason: e.to_string(),
        })?;
        let output = check_status(output, &rendered)?;

        match fed {
            Ok(()) => Ok(output),
            // Exited cleanly without draining trailing input.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("{} closed its input early", rendered);
                Ok(output)
            }
            Err(e) => Err(AgentError::Process {
                command: rendered,
                reason: format!("failed to stream input: {}", e),
            }),
        }
    }

    fn privileged(&self, argv: &[String]) -> Result<Command> {
        let (program, args) = split_argv(argv)?;
        info!("Running privileged command: {} {:?}", program, args);

        #[cfg(unix)]
        {
            let mut cmd = Command::new(&self.sudo_program);
            if let Some(user) = &self.sudo_user {
                cmd.args(["-u", user]);
            }
            cmd.arg(program).args(args);
            Ok(cmd)
        }

        #[cfg(not(unix))]
        {
            let mut cmd = Command::new(program);
            cmd.args(args);
            Ok(cmd)
        }
    }

    async fn execute(&self, mut cmd: Command, argv: &[String], timeout: Option<Duration>) -> Result<Output> {
        let limit = timeout.unwrap_or(self.default_timeout);
        let rendered = argv.join(" ");

        cmd.kill_on_drop(true);
        let output = tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| AgentError::Process {
                command: rendered.clone(),
                reason: format!("timed out after {:?}", limit),
            })?
            .map_err(|e| AgentError::Process {
                command: rendered.clone(),
                reason: e.to_string(),
            })?;

        check_status(output, &rendered)
    }
}

fn check_status(output: Output, rendered: &str) -> Result<Output> {
    debug!("Command finished with exit code: {:?}", output.status.code());

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentError::Process {
            command: rendered.to_string(),
            reason: format!(
                "exit code {:?}: {}",
                output.status.code(),
                stderr.trim()
            ),
        });
    }
    Ok(output)
}

/// Copy a blocking reader into the child's stdin, closing it at end of input.
async fn feed_stdin<R>(mut input: R, mut stdin: ChildStdin) -> std::io::Result<()>
where
    R: Read + Send + 'static,
{
    let (tx, mut rx) = tokio::sync::mpsc::channel::<std::io::Result<Vec<u8>>>(4);
    let reader = tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; INPUT_CHUNK];
        loop {
            let chunk = match input.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => Ok(buf[..n].to_vec()),
                Err(e) => Err(e),
            };
            let failed = chunk.is_err();
            if tx.blocking_send(chunk).is_err() || failed {
                return;
            }
        }
    });

    while let Some(chunk) = rx.recv().await {
        stdin.write_all(&chunk?).await?;
    }
    stdin.shutdown().await?;
    drop(stdin);

    reader.await.map_err(std::io::Error::other)
}

pub(crate) fn argv(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn split_argv(argv: &[String]) -> Result<(&str, &[String])> {
    match argv.split_first() {
        Some((program, args)) if !program.is_empty() => Ok((program.as_str(), args)),
        _ => Err(AgentError::Config("empty command line".to_string())),
    }
}
