//! Analytics maintenance background daemon.
//!
//! Runs scheduled maintenance for the analytics layer:
//! - Pruning records older than the retention period
//! - Flushing every collection to disk
//! - Optionally, a bounded auto-optimization pass with publish

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    MaintenanceConfig, OptimizationConfig, OptimizationResult, OptimizationSettings, StorageConfig,
};
use crate::services::analytics_store::{AnalyticsStore, PruneReport};
use crate::services::optimization::{Optimizer, ReplayObjective};

/// Configuration for the maintenance daemon.
#[derive(Debug, Clone)]
pub struct MaintenanceDaemonConfig {
    /// Interval between maintenance runs.
    pub maintenance_interval: Duration,
    /// Whether to run on startup.
    pub run_on_startup: bool,
    /// Maximum consecutive failures before stopping.
    pub max_consecutive_failures: u32,
    /// Records older than this are pruned.
    pub retention: chrono::Duration,
    /// Run an optimization pass every cycle.
    pub optimize: bool,
    /// Bounds of the optimization pass.
    pub optimization: OptimizationSettings,
}

impl Default for MaintenanceDaemonConfig {
    fn default() -> Self {
        Self::from_config(
            &MaintenanceConfig::default(),
            &StorageConfig::default(),
            &OptimizationSettings::default(),
        )
    }
}

impl MaintenanceDaemonConfig {
    pub fn from_config(
        maintenance: &MaintenanceConfig,
        storage: &StorageConfig,
        optimization: &OptimizationSettings,
    ) -> Self {
        Self {
            maintenance_interval: Duration::from_secs(maintenance.interval_secs.max(1)),
            run_on_startup: true,
            max_consecutive_failures: maintenance.max_consecutive_failures.max(1),
            retention: chrono::Duration::days(i64::from(storage.retention_days)),
            optimize: maintenance.optimize_on_cycle,
            optimization: optimization.clone(),
        }
    }
}

/// Outcome of one maintenance cycle.
#[derive(Debug, Clone)]
pub struct MaintenanceReport {
    pub pruned: PruneReport,
    /// Present when an optimization pass ran.
    pub optimization: Option<OptimizationResult>,
}

/// Event emitted by the maintenance daemon.
#[derive(Debug, Clone)]
pub enum MaintenanceEvent {
    /// Daemon started.
    Started,
    /// Maintenance run started.
    MaintenanceStarted { run_number: u64 },
    /// Maintenance run completed.
    MaintenanceCompleted {
        run_number: u64,
        report: MaintenanceReport,
        duration_ms: u64,
    },
    /// Maintenance run failed.
    MaintenanceFailed { run_number: u64, error: String },
    /// Daemon stopped.
    Stopped { reason: StopReason },
}

/// Reason the daemon stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Requested to stop.
    Requested,
    /// Too many consecutive failures.
    TooManyFailures,
    /// Event receiver dropped.
    ChannelClosed,
}

/// Status of the maintenance daemon.
#[derive(Debug, Clone, Default)]
pub struct DaemonStatus {
    pub running: bool,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<Instant>,
    pub total_pruned: u64,
    /// Versions published by optimization passes.
    pub parameters_published: u64,
}

/// Handle to control the maintenance daemon.
#[derive(Clone)]
pub struct DaemonHandle {
    stop_flag: Arc<AtomicBool>,
    status: Arc<RwLock<DaemonStatus>>,
}

impl DaemonHandle {
    /// Request the daemon to stop.
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

pub struct MaintenanceDaemon {
    store: Arc<AnalyticsStore>,
    optimizer: Option<Arc<Optimizer>>,
    config: MaintenanceDaemonConfig,
    status: Arc<RwLock<DaemonStatus>>,
    stop_flag: Arc<AtomicBool>,
}

impl MaintenanceDaemon {
    pub fn new(store: Arc<AnalyticsStore>, config: MaintenanceDaemonConfig) -> Self {
        Self {
            store,
            optimizer: None,
            config,
            status: Arc::new(RwLock::new(DaemonStatus::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Optimizer used when `config.optimize` is set.
    pub fn with_optimizer(mut self, optimizer: Arc<Optimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    pub fn handle(&self) -> DaemonHandle {
        DaemonHandle {
            stop_flag: self.stop_flag.clone(),
            status: self.status.clone(),
        }
    }

    pub fn config(&self) -> &MaintenanceDaemonConfig {
        &self.config
    }

    /// Run the daemon, returning a channel for events.
    pub fn run(self) -> mpsc::Receiver<MaintenanceEvent> {
        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(async move {
            self.run_loop(tx).await;
        });
        rx
    }

    async fn run_loop(self, tx: mpsc::Sender<MaintenanceEvent>) {
        self.status.write().await.running = true;
        tracing::info!(
            interval_secs = self.config.maintenance_interval.as_secs_f64(),
            optimize = self.config.optimize,
            "Maintenance daemon started"
        );
        let _ = tx.send(MaintenanceEvent::Started).await;

        let mut consecutive_failures = 0u32;
        let mut timer = interval(self.config.maintenance_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;

        let mut run_now = self.config.run_on_startup;
        let reason = loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break StopReason::Requested;
            }
            if tx.is_closed() {
                break StopReason::ChannelClosed;
            }

            if run_now {
                self.run_maintenance_cycle(&tx, &mut consecutive_failures).await;
                if consecutive_failures >= self.config.max_consecutive_failures {
                    break StopReason::TooManyFailures;
                }
            }
            run_now = true;

            tokio::select! {
                _ = timer.tick() => {}
                () = tx.closed() => break StopReason::ChannelClosed,
            }
        };

        self.status.write().await.running = false;
        tracing::info!(reason = ?reason, "Maintenance daemon stopped");
        let _ = tx.send(MaintenanceEvent::Stopped { reason }).await;
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn run_maintenance_cycle(&self, tx: &mpsc::Sender<MaintenanceEvent>, consecutive_failures: &mut u32) {
        let run_number = {
            let mut status = self.status.write().await;
            status.total_runs += 1;
            status.total_runs
        };
        let _ = tx.send(MaintenanceEvent::MaintenanceStarted { run_number }).await;

        let start = Instant::now();
        let result = self.run_once().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(report) => {
                *consecutive_failures = 0;
                {
                    let mut status = self.status.write().await;
                    status.successful_runs += 1;
                    status.last_run = Some(Instant::now());
                    status.total_pruned += report.pruned.total() as u64;
                    if report
                        .optimization
                        .as_ref()
                        .is_some_and(|o| o.published_version.is_some())
                    {
                        status.parameters_published += 1;
                    }
                }
                let _ = tx
                    .send(MaintenanceEvent::MaintenanceCompleted {
                        run_number,
                        report,
                        duration_ms,
                    })
                    .await;
            }
            Err(e) => {
                *consecutive_failures += 1;
                self.status.write().await.failed_runs += 1;
                tracing::warn!(
                    run_number,
                    consecutive_failures = *consecutive_failures,
                    error = %e,
                    "Maintenance run failed"
                );
                let _ = tx
                    .send(MaintenanceEvent::MaintenanceFailed {
                        run_number,
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Run maintenance once (for testing or manual invocation).
    ///
    /// Pruning and flushing failures fail the run. An optimization pass that
    /// cannot run is logged and skipped.
    pub async fn run_once(&self) -> DomainResult<MaintenanceReport> {
        let pruned = self.store.prune_expired(self.config.retention).await?;
        self.store.persist_all().await?;

        let optimization = match (&self.optimizer, self.config.optimize) {
            (Some(optimizer), true) => self.optimize(optimizer).await,
            _ => None,
        };

        Ok(MaintenanceReport { pruned, optimization })
    }

    async fn optimize(&self, optimizer: &Optimizer) -> Option<OptimizationResult> {
        let settings = &self.config.optimization;
        let history = self.store.all_quality().await;
        let objective = ReplayObjective::from_history(&history, settings.holdout_fraction, settings.target_pass_rate);
        let config = OptimizationConfig {
            max_iterations: settings.max_iterations,
            max_duration_ms: settings.max_duration_ms,
            publish: true,
            ..OptimizationConfig::default()
        };
        match optimizer.run(&config, &objective).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(error = %e, "Background optimization failed");
                None
            }
        }
    }
}
