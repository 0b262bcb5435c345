use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Row, params};

use super::models::{
    LastAlert, PerformanceMetric, PruneStats, i64_to_timestamp, timestamp_to_i64,
};
use crate::alerting::rules::Alert;
use crate::monitoring::types::{CheckType, HealthCheck};
use crate::pool::LibsqlPool;

/// Aggregate over a window of checks
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CheckCounts {
    pub total: u64,
    pub successful: u64,
    /// Mean response time, `None` when the window is empty
    pub avg_response_time: Option<f64>,
}

impl CheckCounts {
    /// Successful share of the window as 0-100, 0 for an empty window
    pub fn uptime_percentage(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }
}

/// Append-only log of checks, alerts and metrics
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Append a health check for a target
    async fn record_check(&self, target: &str, check: &HealthCheck) -> Result<i64>;

    /// Last `limit` checks of one type for a target, newest first
    async fn recent_checks(&self, target: &str, check_type: CheckType, limit: usize) -> Result<Vec<HealthCheck>>;

    /// Last `limit` checks of any type for a target, newest first
    async fn latest_checks(&self, target: &str, limit: usize) -> Result<Vec<HealthCheck>>;

    /// Checks with `from <= timestamp <= to`, oldest first
    async fn checks_between(&self, target: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HealthCheck>>;

    /// Totals for checks newer than `since`
    async fn check_counts(&self, target: &str, since: DateTime<Utc>) -> Result<CheckCounts>;

    /// Append an alert, returning its id
    async fn record_alert(&self, alert: &Alert) -> Result<i64>;

    /// Unresolved alerts for a target, newest first
    async fn unresolved_alerts(&self, target: &str) -> Result<Vec<Alert>>;

    /// Last `limit` alerts for a target regardless of state, newest first
    async fn recent_alerts(&self, target: &str, limit: usize) -> Result<Vec<Alert>>;

    /// Mark an alert resolved; false when it does not exist or is already resolved
    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Newest alert per (target, rule)
    async fn last_alert_times(&self) -> Result<Vec<LastAlert>>;

    /// Append a performance metric
    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<i64>;

    /// Metrics with `from <= timestamp <= to`, oldest first
    async fn metrics_between(&self, target: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PerformanceMetric>>;

    /// Delete every row older than `cutoff` from all three tables
    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<PruneStats>;
}

/// LibSQL result store
pub struct LibsqlStore {
    pool: LibsqlPool,
}

const CHECK_COLUMNS: &str = "timestamp, check_type, endpoint, status, response_time, error, details";
const ALERT_COLUMNS: &str = "id, timestamp, target_name, alert_type, severity, message, resolved, resolved_at";

impl LibsqlStore {
    /// Create a new store from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<crate::pool::LibsqlManager>> {
        Ok(self.pool.get().await?)
    }

    fn check_from_row(row: &Row) -> Result<HealthCheck> {
        let check_type: String = row.get(1)?;
        let status: String = row.get(3)?;
        let details: Option<String> = row.get(6)?;

        Ok(HealthCheck {
            timestamp: i64_to_timestamp(row.get(0)?)?,
            check_type: check_type.parse()?,
            endpoint: row.get(2)?,
            status: status.parse()?,
            response_time: row.get(4)?,
            error: row.get(5)?,
            detail: details.map(|raw| serde_json::from_str(&raw)).transpose()?,
        })
    }

    fn alert_from_row(row: &Row) -> Result<Alert> {
        let severity: String = row.get(4)?;

        Ok(Alert {
            id: Some(row.get(0)?),
            timestamp: i64_to_timestamp(row.get(1)?)?,
            target: row.get(2)?,
            rule_name: row.get(3)?,
            severity: severity.parse()?,
            message: row.get(5)?,
            resolved: row.get::<i64>(6)? != 0,
            resolved_at: row.get::<Option<i64>>(7)?.map(i64_to_timestamp).transpose()?,
        })
    }

    async fn query_checks(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<HealthCheck>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut checks = Vec::new();
        while let Some(row) = rows.next().await? {
            checks.push(Self::check_from_row(&row)?);
        }
        Ok(checks)
    }

    async fn query_alerts(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Alert>> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query(sql, params).await?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next().await? {
            alerts.push(Self::alert_from_row(&row)?);
        }
        Ok(alerts)
    }
}

#[async_trait]
impl ResultStore for LibsqlStore {
    async fn record_check(&self, target: &str, check: &HealthCheck) -> Result<i64> {
        let conn = self.get_conn().await?;
        let details = check.detail.as_ref().map(serde_json::to_string).transpose()?;

        conn.execute(
            "INSERT INTO health_checks (timestamp, target_name, check_type, endpoint, status, response_time, status_code, error, details) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                timestamp_to_i64(check.timestamp),
                target,
                check.check_type.as_str(),
                check.endpoint.clone(),
                check.status.as_str(),
                check.response_time,
                check.status_code().map(i64::from),
                check.error.clone(),
                details
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn recent_checks(&self, target: &str, check_type: CheckType, limit: usize) -> Result<Vec<HealthCheck>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM health_checks WHERE target_name = ? AND check_type = ? ORDER BY timestamp DESC, id DESC LIMIT ?"
        );
        self.query_checks(&sql, params![target, check_type.as_str(), limit as i64]).await
    }

    async fn latest_checks(&self, target: &str, limit: usize) -> Result<Vec<HealthCheck>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM health_checks WHERE target_name = ? ORDER BY timestamp DESC, id DESC LIMIT ?"
        );
        self.query_checks(&sql, params![target, limit as i64]).await
    }

    async fn checks_between(&self, target: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HealthCheck>> {
        let sql = format!(
            "SELECT {CHECK_COLUMNS} FROM health_checks WHERE target_name = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC, id ASC"
        );
        self.query_checks(&sql, params![target, timestamp_to_i64(from), timestamp_to_i64(to)]).await
    }

    async fn check_counts(&self, target: &str, since: DateTime<Utc>) -> Result<CheckCounts> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT COUNT(*), SUM(CASE WHEN status = 'UP' THEN 1 ELSE 0 END), AVG(response_time) FROM health_checks WHERE target_name = ? AND timestamp > ?",
                params![target, timestamp_to_i64(since)],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(CheckCounts {
                total: row.get::<i64>(0)? as u64,
                successful: row.get::<Option<i64>>(1)?.unwrap_or(0) as u64,
                avg_response_time: row.get::<Option<f64>>(2)?,
            }),
            None => Ok(CheckCounts::default()),
        }
    }

    async fn record_alert(&self, alert: &Alert) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO alerts (timestamp, target_name, alert_type, severity, message, resolved, resolved_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                timestamp_to_i64(alert.timestamp),
                alert.target.clone(),
                alert.rule_name.clone(),
                alert.severity.as_str(),
                alert.message.clone(),
                if alert.resolved { 1 } else { 0 },
                alert.resolved_at.map(timestamp_to_i64)
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn unresolved_alerts(&self, target: &str) -> Result<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE target_name = ? AND resolved = 0 ORDER BY timestamp DESC, id DESC"
        );
        self.query_alerts(&sql, params![target]).await
    }

    async fn recent_alerts(&self, target: &str, limit: usize) -> Result<Vec<Alert>> {
        let sql = format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE target_name = ? ORDER BY timestamp DESC, id DESC LIMIT ?"
        );
        self.query_alerts(&sql, params![target, limit as i64]).await
    }

    async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.get_conn().await?;
        let changed = conn
            .execute(
                "UPDATE alerts SET resolved = 1, resolved_at = ? WHERE id = ? AND resolved = 0",
                params![timestamp_to_i64(at), id],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn last_alert_times(&self) -> Result<Vec<LastAlert>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT target_name, alert_type, MAX(timestamp) FROM alerts GROUP BY target_name, alert_type",
                (),
            )
            .await?;

        let mut last = Vec::new();
        while let Some(row) = rows.next().await? {
            last.push(LastAlert {
                target: row.get(0)?,
                rule_name: row.get(1)?,
                timestamp: i64_to_timestamp(row.get(2)?)?,
            });
        }
        Ok(last)
    }

    async fn record_metric(&self, metric: &PerformanceMetric) -> Result<i64> {
        let conn = self.get_conn().await?;

        conn.execute(
            "INSERT INTO performance_metrics (timestamp, target_name, metric_type, value, period) VALUES (?, ?, ?, ?, ?)",
            params![
                timestamp_to_i64(metric.timestamp),
                metric.target.clone(),
                metric.metric_type.as_str(),
                metric.value,
                metric.period.clone()
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }

    async fn metrics_between(&self, target: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PerformanceMetric>> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, timestamp, target_name, metric_type, value, period FROM performance_metrics WHERE target_name = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC, id ASC",
                params![target, timestamp_to_i64(from), timestamp_to_i64(to)],
            )
            .await?;

        let mut metrics = Vec::new();
        while let Some(row) = rows.next().await? {
            let metric_type: String = row.get(3)?;
            metrics.push(PerformanceMetric {
                id: Some(row.get(0)?),
                timestamp: i64_to_timestamp(row.get(1)?)?,
                target: row.get(2)?,
                metric_type: metric_type.parse()?,
                value: row.get(4)?,
                period: row.get(5)?,
            });
        }
        Ok(metrics)
    }

    async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<PruneStats> {
        let conn = self.get_conn().await?;
        let cutoff = timestamp_to_i64(cutoff);

        let tx = conn.transaction().await?;
        let health_checks = tx.execute("DELETE FROM health_checks WHERE timestamp < ?", params![cutoff]).await?;
        let alerts = tx.execute("DELETE FROM alerts WHERE timestamp < ?", params![cutoff]).await?;
        let performance_metrics =
            tx.execute("DELETE FROM performance_metrics WHERE timestamp < ?", params![cutoff]).await?;
        tx.commit().await?;

        Ok(PruneStats { health_checks, alerts, performance_metrics })
    }
}
