use super::ServiceStatus;
use crate::admin::session::Connector;
use crate::error::AgentError;
use crate::superuser::SuperuserStore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default interval between status probes while waiting for a transition
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Receives status changes meant for the orchestrator.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: ServiceStatus);
}

/// Logs reported status; used when no orchestrator channel is wired in.
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn report(&self, status: ServiceStatus) {
        info!(status = %status, "Reporting service status");
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    status: ServiceStatus,
    restart_in_progress: bool,
}

/// Tracks the server's status by probing it with an administrative session.
///
/// Probes are read-only against the server, and no lock is held across a
/// probe or while sleeping between probes.
pub struct StatusMonitor {
    connector: Connector,
    superuser: Arc<SuperuserStore>,
    poll_interval: Duration,
    reporter: Arc<dyn StatusReporter>,
    state: Mutex<MonitorState>,
}

impl StatusMonitor {
    pub fn new(connector: Connector, superuser: Arc<SuperuserStore>) -> Self {
        Self {
            connector,
            superuser,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reporter: Arc::new(TracingReporter),
            state: Mutex::new(MonitorState::default()),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last known status.
    pub fn status(&self) -> ServiceStatus {
        self.state().status
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// Record a status, forwarding it to the orchestrator when asked to.
    pub fn set_status(&self, status: ServiceStatus, update_external: bool) {
        let previous = std::mem::replace(&mut self.state().status, status);
        if previous != status {
            debug!("Service status changed from {} to {}", previous, status);
        }
        if update_external {
            self.reporter.report(status);
        }
    }

    /// Connect as the current superuser. Anything short of a working session
    /// counts as SHUTDOWN.
    pub async fn probe_actual_status(&self) -> ServiceStatus {
        match self.connector.open(&self.superuser.current()).await {
            Ok(_session) => ServiceStatus::Running,
            Err(AgentError::SessionUnavailable(reason)) => {
                debug!("Database is not reachable: {}", reason);
                ServiceStatus::Shutdown
            }
            Err(e) => {
                error!("Error getting database status: {}", e);
                ServiceStatus::Shutdown
            }
        }
    }

    /// Poll until the server reaches `target` or `timeout` elapses.
    ///
    /// Returns whether the target was reached; timing out is not an error.
    pub async fn wait_for_status_to_change(
        &self,
        target: ServiceStatus,
        timeout: Duration,
        update_external: bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let actual = self.probe_actual_status().await;
            if actual == target {
                self.set_status(actual, update_external);
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    "Timeout while waiting for database status to change to {} (still {})",
                    target, actual
                );
                return false;
            }
            debug!("Waiting for database status to change to {} (currently {})", target, actual);
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    pub fn begin_install(&self) {
        self.set_status(ServiceStatus::Building, true);
    }

    pub fn begin_restart(&self) {
        self.state().restart_in_progress = true;
    }

    pub fn is_restarting(&self) -> bool {
        self.state().restart_in_progress
    }

    pub(crate) fn clear_restart(&self) {
        self.state().restart_in_progress = false;
    }

    /// Clear the in-progress marker and resync status with the server.
    pub async fn end_install_or_restart(&self) {
        self.clear_restart();
        let actual = self.probe_actual_status().await;
        debug!("Ending install or restart, actual status is {}", actual);
        self.set_status(actual, true);
    }

    /// A transition exceeded its timeout.
    pub fn mark_failed(&self, update_external: bool) {
        self.clear_restart();
        self.set_status(ServiceStatus::Failed, update_external);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryEngine, RecordingReporter};

    fn monitor(engine: &MemoryEngine) -> StatusMonitor {
        StatusMonitor::new(engine.connector(), engine.superuser_store())
            .with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_probe_reflects_reachability() {
        let engine = MemoryEngine::new();
        let monitor = monitor(&engine);
        assert_eq!(monitor.probe_actual_status().await, ServiceStatus::Running);

        engine.set_reachable(false);
        assert_eq!(monitor.probe_actual_status().await, ServiceStatus::Shutdown);
        assert_eq!(engine.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_error_maps_to_shutdown() {
        let engine = MemoryEngine::new();
        let store = engine.superuser_store();
        store.replace(crate::admin::AdminUser::new("cassandra", "wrong"));
        let monitor = StatusMonitor::new(engine.connector(), store);
        assert_eq!(monitor.probe_actual_status().await, ServiceStatus::Shutdown);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_error() {
        let engine = MemoryEngine::new();
        engine.set_reachable(false);
        let monitor = monitor(&engine);

        let reached = monitor
            .wait_for_status_to_change(ServiceStatus::Running, Duration::from_millis(50), true)
            .await;
        assert!(!reached);
        assert_eq!(monitor.status(), ServiceStatus::Unknown);
    }

    #[tokio::test]
    async fn test_wait_observes_transition() {
        let engine = MemoryEngine::new();
        engine.set_reachable(false);
        let reporter = Arc::new(RecordingReporter::default());
        let monitor = monitor(&engine).with_reporter(reporter.clone());

        let toggler = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            toggler.set_reachable(true);
        });

        let reached = monitor
            .wait_for_status_to_change(ServiceStatus::Running, Duration::from_secs(2), true)
            .await;
        assert!(reached);
        assert!(monitor.is_running());
        assert_eq!(reporter.reported(), vec![ServiceStatus::Running]);
    }

    #[tokio::test]
    async fn test_restart_marker_cleared_on_end() {
        let engine = MemoryEngine::new();
        let monitor = monitor(&engine);

        monitor.begin_restart();
        assert!(monitor.is_restarting());
        monitor.end_install_or_restart().await;
        assert!(!monitor.is_restarting());
        assert_eq!(monitor.status(), ServiceStatus::Running);
    }
}
