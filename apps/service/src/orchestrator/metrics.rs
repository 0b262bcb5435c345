//! Hourly rollup of response time and uptime per target.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::config::PerformanceThresholds;
use crate::database::ResultStore;
use crate::database::models::{MetricType, PerformanceMetric};

pub struct MetricsAggregator {
    store: Arc<dyn ResultStore>,
    targets: Vec<String>,
    thresholds: PerformanceThresholds,
}

impl MetricsAggregator {
    pub fn new(store: Arc<dyn ResultStore>, targets: Vec<String>, thresholds: PerformanceThresholds) -> Self {
        Self { store, targets, thresholds }
    }

    pub async fn aggregate(&self) -> Result<Vec<PerformanceMetric>> {
        self.aggregate_at(Utc::now()).await
    }

    /// Write `avg_response_time` and `uptime_percentage` for every target with
    /// checks in the hour before `now`
    pub async fn aggregate_at(&self, now: DateTime<Utc>) -> Result<Vec<PerformanceMetric>> {
        let since = now - Duration::hours(1);
        let mut written = Vec::new();

        for target in &self.targets {
            let counts = self.store.check_counts(target, since).await?;
            let Some(avg_response_time) = counts.avg_response_time.filter(|_| counts.total > 0) else {
                debug!(target = %target, "No checks in the last hour, skipping metrics");
                continue;
            };

            let uptime = counts.uptime_percentage();
            for mut metric in [
                PerformanceMetric::hourly(now, target, MetricType::AvgResponseTime, avg_response_time),
                PerformanceMetric::hourly(now, target, MetricType::UptimePercentage, uptime),
            ] {
                metric.id = Some(self.store.record_metric(&metric).await?);
                written.push(metric);
            }

            self.log_uptime(target, uptime);
        }

        debug!(metrics = written.len(), "Performance metrics aggregated");
        Ok(written)
    }

    fn log_uptime(&self, target: &str, uptime_percentage: f64) {
        let uptime = uptime_percentage / 100.0;
        if uptime < self.thresholds.uptime_critical {
            error!(target, uptime_percentage, threshold = self.thresholds.uptime_critical, "Uptime below critical threshold");
        } else if uptime < self.thresholds.uptime_warning {
            warn!(target, uptime_percentage, threshold = self.thresholds.uptime_warning, "Uptime below warning threshold");
        }
    }
}
