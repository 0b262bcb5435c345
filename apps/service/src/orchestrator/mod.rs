/// Orchestrator module - coordinates all components
///
/// The orchestrator owns the lifecycle of the daemon:
/// - One monitoring task per configured target
/// - One maintenance task for retention pruning and hourly metrics
/// - A shared stop signal observed by every task
pub mod metrics;
pub mod retention;


pub use metrics::MetricsAggregator;
pub use retention::{RetentionCleanup, RetentionPolicy};

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alerting::AlertEngine;
use crate::config::Config;
use crate::database::{ResultStore, open_store};
use crate::monitoring::{MonitoringExecutor, MonitoringScheduler};
use crate::notify::NotificationDispatcher;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(3600);
const MAINTENANCE_BACKOFF: Duration = Duration::from_secs(300);

/// The running monitor daemon
pub struct Monitor {
    config: Arc<Config>,
    store: Arc<dyn ResultStore>,
    executor: Arc<MonitoringExecutor>,
    engine: Arc<AlertEngine>,
    shutdown_tx: watch::Sender<bool>,
    task_handles: Vec<JoinHandle<()>>,
}

impl Monitor {
    /// Open the store, start every task and run until Ctrl-C
    pub async fn start(config: Config) -> Result<()> {
        info!(path = %config.database_path.display(), "Opening result store...");
        let store: Arc<dyn ResultStore> = Arc::new(open_store(&config.database_path).await?);

        let executor = Arc::new(MonitoringExecutor::new(config.performance_thresholds.response_time_warning)?);
        let dispatcher = Arc::new(NotificationDispatcher::from_settings(&config.notifications)?);

        let mut monitor = Self::new(config, store, executor, dispatcher);
        monitor.run().await
    }

    pub fn new(
        config: Config,
        store: Arc<dyn ResultStore>,
        executor: Arc<MonitoringExecutor>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        let engine = Arc::new(AlertEngine::new(
            config.alert_rules.clone(),
            store.clone(),
            dispatcher,
            config.performance_thresholds.response_time_critical,
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Self { config: Arc::new(config), store, executor, engine, shutdown_tx, task_handles: Vec::new() }
    }

    async fn run(&mut self) -> Result<()> {
        self.spawn().await?;
        info!("Monitor started - press Ctrl-C to stop");

        tokio::signal::ctrl_c().await?;
        info!("Shutdown requested");
        self.stop().await;
        Ok(())
    }

    /// Start the monitoring and maintenance tasks
    pub async fn spawn(&mut self) -> Result<()> {
        match self.engine.restore_cooldowns().await {
            Ok(restored) if restored > 0 => info!(restored, "Alert cooldowns restored from store"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not restore alert cooldowns"),
        }

        if self.config.targets.is_empty() {
            warn!("No targets configured");
        }

        let scheduler = MonitoringScheduler::new(
            self.executor.clone(),
            self.store.clone(),
            self.engine.clone(),
            self.shutdown_tx.subscribe(),
        );
        info!(targets = self.config.targets.len(), "Scheduling targets...");
        self.task_handles.extend(scheduler.schedule_targets(self.config.targets.clone()));

        let retention = RetentionCleanup::new(self.store.clone(), RetentionPolicy::new(self.config.retention_days));
        let metrics = MetricsAggregator::new(
            self.store.clone(),
            self.config.targets.iter().map(|t| t.name.clone()).collect(),
            self.config.performance_thresholds,
        );
        let shutdown = self.shutdown_tx.subscribe();
        self.task_handles.push(tokio::spawn(run_maintenance(retention, metrics, shutdown)));

        Ok(())
    }

    /// Signal every task and wait for it to finish its current round
    pub async fn stop(&mut self) {
        self.shutdown_tx.send_replace(true);

        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Monitor task ended abnormally");
            }
        }
        info!("Monitor stopped");
    }
}

async fn run_maintenance(retention: RetentionCleanup, metrics: MetricsAggregator, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let pause = match maintenance_pass(&retention, &metrics).await {
            Ok(()) => MAINTENANCE_INTERVAL,
            Err(e) => {
                error!(error = %e, "Maintenance pass failed");
                MAINTENANCE_BACKOFF
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = shutdown.changed() => break,
        }
    }
    debug!("Maintenance task stopped");
}

async fn maintenance_pass(retention: &RetentionCleanup, metrics: &MetricsAggregator) -> Result<()> {
    retention.prune().await?;
    metrics.aggregate().await?;
    Ok(())
}
