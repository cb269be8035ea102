//! Background maintenance for the registry.
//!
//! Three periodic jobs run on one tokio task:
//! - stats: persist counter deltas and deliver queued audit records
//! - maintenance: drop inactive clients and stale cache entries
//! - reload: reload rules once the reload interval has elapsed
//!
//! Each job touches the persistence gateway, which may block, so it runs on
//! the blocking thread pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use crate::application::registry::DosRegistry;

/// How long `shutdown` waits for the task to finish.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Error returned when maintenance configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceConfigError {
    ZeroStatsInterval,
    ZeroMaintenanceInterval,
    ZeroReloadInterval,
}

impl std::fmt::Display for MaintenanceConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MaintenanceConfigError::ZeroStatsInterval => "stats interval",
            MaintenanceConfigError::ZeroMaintenanceInterval => "maintenance interval",
            MaintenanceConfigError::ZeroReloadInterval => "reload interval",
        };
        write!(f, "{} must be greater than 0", name)
    }
}

impl std::error::Error for MaintenanceConfigError {}

/// Error returned when the maintenance task does not stop cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// The task panicked
    TaskPanicked,
    /// The task was cancelled before it could finish
    TaskCancelled,
    /// The task did not finish within the shutdown timeout
    Timeout,
}

impl std::fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownError::TaskPanicked => write!(f, "maintenance task panicked"),
            ShutdownError::TaskCancelled => write!(f, "maintenance task was cancelled"),
            ShutdownError::Timeout => write!(
                f,
                "maintenance task did not stop within {:?}",
                SHUTDOWN_TIMEOUT
            ),
        }
    }
}

impl std::error::Error for ShutdownError {}

/// Intervals of the maintenance jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceConfig {
    pub stats_interval: Duration,
    pub maintenance_interval: Duration,
    /// How often to check whether a reload is due
    pub reload_interval: Duration,
    /// Run the stats job one last time on shutdown
    pub final_flush: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_secs(10),
            maintenance_interval: Duration::from_secs(5 * 60),
            reload_interval: Duration::from_secs(15 * 60),
            final_flush: true,
        }
    }
}

impl MaintenanceConfig {
    /// # Errors
    /// Returns an error if any interval is zero.
    pub fn new(
        stats_interval: Duration,
        maintenance_interval: Duration,
        reload_interval: Duration,
    ) -> Result<Self, MaintenanceConfigError> {
        if stats_interval.is_zero() {
            return Err(MaintenanceConfigError::ZeroStatsInterval);
        }
        if maintenance_interval.is_zero() {
            return Err(MaintenanceConfigError::ZeroMaintenanceInterval);
        }
        if reload_interval.is_zero() {
            return Err(MaintenanceConfigError::ZeroReloadInterval);
        }
        Ok(Self {
            stats_interval,
            maintenance_interval,
            reload_interval,
            final_flush: true,
        })
    }

    pub fn with_final_flush(mut self, final_flush: bool) -> Self {
        self.final_flush = final_flush;
        self
    }
}

/// Spawns the maintenance task.
pub struct MaintenanceScheduler;

impl MaintenanceScheduler {
    /// Start the maintenance task on the current tokio runtime.
    ///
    /// # Panics
    /// Panics if called outside a tokio runtime.
    pub fn start(registry: Arc<DosRegistry>, config: MaintenanceConfig) -> MaintenanceHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run(registry, config, shutdown_rx));
        MaintenanceHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

/// Handle to a running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Stop the task and wait for it, running the final stats flush if
    /// configured.
    ///
    /// # Errors
    /// Returns an error if the task panicked, was cancelled, or did not stop
    /// within the shutdown timeout.
    pub async fn shutdown(mut self) -> Result<(), ShutdownError> {
        if let Some(tx) = self.shutdown_tx.take() {
            // the task may already be gone
            let _ = tx.send(());
        }
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut self.task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(join)) if join.is_panic() => Err(ShutdownError::TaskPanicked),
            Ok(Err(_)) => Err(ShutdownError::TaskCancelled),
            Err(_) => {
                self.task.abort();
                Err(ShutdownError::Timeout)
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[derive(Debug, Clone, Copy)]
enum Job {
    Stats,
    Maintenance,
    Reload,
}

async fn run(
    registry: Arc<DosRegistry>,
    config: MaintenanceConfig,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let ticker = |period: Duration| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    };
    let mut stats = ticker(config.stats_interval);
    let mut maintenance = ticker(config.maintenance_interval);
    let mut reload = ticker(config.reload_interval);

    loop {
        let job = tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = stats.tick() => Job::Stats,
            _ = maintenance.tick() => Job::Maintenance,
            _ = reload.tick() => Job::Reload,
        };
        execute(&registry, job).await;
    }

    if config.final_flush {
        execute(&registry, Job::Stats).await;
    }
    debug!("Maintenance task stopped");
}

async fn execute(registry: &Arc<DosRegistry>, job: Job) {
    let registry = Arc::clone(registry);
    let result = tokio::task::spawn_blocking(move || match job {
        Job::Stats => {
            let persisted = registry.persist_stats();
            let audits = registry.flush_audits();
            debug!(clients = persisted, audits, "Statistics persisted");
        }
        Job::Maintenance => {
            registry.cleanup_inactive();
        }
        Job::Reload => {
            registry.check_reload();
        }
    })
    .await;
    if let Err(error) = result {
        error!(job = ?job, %error, "Maintenance job failed");
    }
}
