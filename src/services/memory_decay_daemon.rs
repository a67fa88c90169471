//! Memory decay background daemon.
//!
//! Runs scheduled maintenance on the memory store: pruning expired entries
//! and promoting memories accessed by enough distinct accessors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant};

use crate::domain::errors::DomainResult;

use super::memory_service::{MaintenanceReport, MemoryService};

/// Configuration for the memory decay daemon.
#[derive(Debug, Clone)]
pub struct DecayDaemonConfig {
    /// Interval between maintenance runs.
    pub maintenance_interval: Duration,
    /// Whether to run on startup.
    pub run_on_startup: bool,
    /// Maximum consecutive failures before stopping.
    pub max_consecutive_failures: u32,
    /// Distinct accessors required before a memory is promoted a tier.
    pub min_distinct_accessors_for_promotion: usize,
}

impl Default for DecayDaemonConfig {
    fn default() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(300),
            run_on_startup: true,
            max_consecutive_failures: 5,
            min_distinct_accessors_for_promotion: 2,
        }
    }
}

impl DecayDaemonConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self { maintenance_interval: interval, ..Default::default() }
    }

    /// Config tuned for fast maintenance cycles in tests.
    pub fn frequent() -> Self {
        Self {
            maintenance_interval: Duration::from_secs(10),
            run_on_startup: true,
            max_consecutive_failures: 3,
            min_distinct_accessors_for_promotion: 2,
        }
    }
}

/// Event emitted by the decay daemon.
#[derive(Debug, Clone)]
pub enum DecayDaemonEvent {
    Started,
    MaintenanceStarted { run_number: u64 },
    MaintenanceCompleted { run_number: u64, report: MaintenanceReport, duration_ms: u64 },
    MaintenanceFailed { run_number: u64, error: String },
    Stopped { reason: StopReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    TooManyFailures,
}

/// Status of the decay daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<Instant>,
    pub total_pruned: u64,
    pub total_promoted: u64,
}

/// Handle to control the decay daemon.
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    status: Arc<RwLock<DaemonStatus>>,
}

impl DaemonHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_flag.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }
}

/// Memory decay background daemon.
pub struct MemoryDecayDaemon {
    memory_service: Arc<MemoryService>,
    config: DecayDaemonConfig,
    status: Arc<RwLock<DaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
}

impl MemoryDecayDaemon {
    pub fn new(memory_service: Arc<MemoryService>, config: DecayDaemonConfig) -> Self {
        Self {
            memory_service,
            config,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_defaults(memory_service: Arc<MemoryService>) -> Self {
        Self::new(memory_service, DecayDaemonConfig::default())
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle { stop_flag: self.stop_flag.clone(), status: self.status.clone() }
    }

    /// Run the daemon as a background task, returning a channel for events.
    pub fn run(self) -> mpsc::Receiver<DecayDaemonEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<DecayDaemonEvent>) {
        {
            let mut status = self.status.write().await;
            status.running = true;
        }
        let _ = tx.send(DecayDaemonEvent::Started).await;

        let mut consecutive_failures = 0u32;
        let mut interval_timer = interval(self.config.maintenance_interval);

        if self.config.run_on_startup {
            self.run_maintenance_cycle(&tx, &mut consecutive_failures).await;
        }

        loop {
            interval_timer.tick().await;
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }

            self.run_maintenance_cycle(&tx, &mut consecutive_failures).await;

            if consecutive_failures >= self.config.max_consecutive_failures {
                let mut status = self.status.write().await;
                status.running = false;
                drop(status);
                let _ = tx.send(DecayDaemonEvent::Stopped { reason: StopReason::TooManyFailures }).await;
                return;
            }
        }

        let mut status = self.status.write().await;
        status.running = false;
        drop(status);
        let _ = tx.send(DecayDaemonEvent::Stopped { reason: StopReason::Requested }).await;
    }

    async fn run_maintenance_cycle(&self, tx: &mpsc::Sender<DecayDaemonEvent>, consecutive_failures: &mut u32) {
        let run_number = {
            let mut status = self.status.write().await;
            status.total_runs += 1;
            status.total_runs
        };
        let _ = tx.send(DecayDaemonEvent::MaintenanceStarted { run_number }).await;

        let start = Instant::now();
        let result = self.run_once().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                *consecutive_failures = 0;
                let mut status = self.status.write().await;
                status.successful_runs += 1;
                status.last_run = Some(Instant::now());
                status.total_pruned += report.expired_pruned;
                status.total_promoted += report.promoted as u64;
                drop(status);
                let _ = tx.send(DecayDaemonEvent::MaintenanceCompleted { run_number, report, duration_ms }).await;
            }
            Err(e) => {
                *consecutive_failures += 1;
                let mut status = self.status.write().await;
                status.failed_runs += 1;
                drop(status);
                let _ = tx.send(DecayDaemonEvent::MaintenanceFailed { run_number, error: e.to_string() }).await;
            }
        }
    }

    /// Run maintenance once, synchronously. Used by callers that do their
    /// own scheduling instead of [`Self::run`].
    pub async fn run_once(&self) -> DomainResult<MaintenanceReport> {
        self.memory_service
            .run_maintenance(self.config.min_distinct_accessors_for_promotion)
            .await
    }

    pub async fn status(&self) -> DaemonStatus {
        self.status.read().await.clone()
    }

    pub fn config(&self) -> &DecayDaemonConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default() {
        let config = DecayDaemonConfig::default();
        assert_eq!(config.maintenance_interval, Duration::from_secs(300));
        assert!(config.run_on_startup);
        assert_eq!(config.max_consecutive_failures, 5);
    }

    #[test]
    fn config_with_interval() {
        let config = DecayDaemonConfig::with_interval(Duration::from_secs(60));
        assert_eq!(config.maintenance_interval, Duration::from_secs(60));
    }

    #[test]
    fn config_frequent() {
        let config = DecayDaemonConfig::frequent();
        assert_eq!(config.maintenance_interval, Duration::from_secs(10));
    }

    #[test]
    fn daemon_status_default() {
        let status = DaemonStatus::default();
        assert!(!status.running);
        assert_eq!(status.total_runs, 0);
    }

    #[test]
    fn stop_reason_equality() {
        assert_eq!(StopReason::Requested, StopReason::Requested);
        assert_ne!(StopReason::Requested, StopReason::TooManyFailures);
    }
}
