use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::executor::MonitoringExecutor;
use super::types::HealthCheck;
use crate::alerting::AlertEngine;
use crate::config::Target;
use crate::database::ResultStore;

/// Pause after a round that could not be stored or evaluated
pub const ERROR_BACKOFF: Duration = Duration::from_secs(30);

/// Monitoring scheduler - one independent round loop per target
#[derive(Clone)]
pub struct MonitoringScheduler {
    executor: Arc<MonitoringExecutor>,
    store: Arc<dyn ResultStore>,
    engine: Arc<AlertEngine>,
    shutdown: watch::Receiver<bool>,
}

impl MonitoringScheduler {
    pub fn new(
        executor: Arc<MonitoringExecutor>,
        store: Arc<dyn ResultStore>,
        engine: Arc<AlertEngine>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { executor, store, engine, shutdown }
    }

    /// Run every configured check for `target` once, in order.
    ///
    /// Each check is persisted before the alert engine sees it, so the
    /// engine's failure streak includes the current result.
    pub async fn run_round(&self, target: &Target) -> Result<Vec<HealthCheck>> {
        let mut checks = Vec::with_capacity(target.checks.len());

        for &check_type in &target.checks {
            let check = self.executor.execute_check(target, check_type).await;
            self.store.record_check(&target.name, &check).await?;
            debug!(
                target = %target.name,
                check_type = %check.check_type,
                status = %check.status,
                response_time = check.response_time,
                "Check recorded"
            );

            self.engine.evaluate(&target.name, &check).await?;
            checks.push(check);
        }

        Ok(checks)
    }

    /// Spawn the round loop for one target
    pub fn schedule_target(&self, target: Target) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run_target(target).await })
    }

    pub fn schedule_targets(&self, targets: Vec<Target>) -> Vec<JoinHandle<()>> {
        targets.into_iter().map(|target| self.schedule_target(target)).collect()
    }

    async fn run_target(self, target: Target) {
        let interval = Duration::from_secs(target.check_interval);
        let mut shutdown = self.shutdown.clone();
        info!(target = %target.name, interval_secs = target.check_interval, checks = ?target.checks, "Monitoring target");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match self.run_round(&target).await {
                Ok(_) => interval,
                Err(e) => {
                    error!(target = %target.name, error = %e, "Monitoring round failed");
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(target = %target.name, "Stopped monitoring target");
    }
}
