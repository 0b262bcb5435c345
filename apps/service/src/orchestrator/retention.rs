//! Retention pruning of checks, alerts and metrics.
//!
//! Every table keeps `retention_days` of history; anything older is removed
//! in one transaction by the maintenance task.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::ResultStore;
use crate::database::models::PruneStats;

/// How long stored rows are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub retention_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    fn retention(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    /// Rows strictly older than this are pruned
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.retention()
    }
}

/// Cleanup manager for expired rows
pub struct RetentionCleanup {
    store: Arc<dyn ResultStore>,
    policy: RetentionPolicy,
}

impl RetentionCleanup {
    pub fn new(store: Arc<dyn ResultStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn prune(&self) -> Result<PruneStats> {
        self.prune_at(Utc::now()).await
    }

    pub async fn prune_at(&self, now: DateTime<Utc>) -> Result<PruneStats> {
        let cutoff = self.policy.cutoff(now);
        debug!(retention_days = self.policy.retention_days, %cutoff, "Pruning expired rows");

        let stats = self.store.prune_older_than(cutoff).await?;
        if stats.total() > 0 {
            info!(
                health_checks = stats.health_checks,
                alerts = stats.alerts,
                performance_metrics = stats.performance_metrics,
                "Retention cleanup completed"
            );
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_policy_defaults() {
        assert_eq!(RetentionPolicy::default().retention_days, 30);
    }

    #[test]
    fn test_cutoff_calculation() {
        let now = Utc::now();
        let policy = RetentionPolicy::new(7);
        assert_eq!(now - policy.cutoff(now), Duration::days(7));
    }
}
