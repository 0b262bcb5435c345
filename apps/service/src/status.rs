//! Read-only status snapshot over the result store.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::alerting::rules::Alert;
use crate::config::Target;
use crate::database::ResultStore;
use crate::monitoring::types::HealthCheck;

const RECENT_CHECKS: usize = 10;
const HEALTH_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetStatus {
    pub name: String,
    pub url: String,
    pub status: HealthState,
    /// Share of UP checks over the last 24 hours, 0-100
    pub uptime_24h: f64,
    /// Newest first
    pub recent_checks: Vec<HealthCheck>,
    pub active_alerts: Vec<Alert>,
    pub active_alert_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total_targets: usize,
    pub healthy_targets: usize,
    pub unhealthy_targets: usize,
    pub total_active_alerts: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub summary: StatusSummary,
    pub targets: Vec<TargetStatus>,
}

pub struct StatusReporter {
    store: Arc<dyn ResultStore>,
    targets: Vec<Target>,
}

impl StatusReporter {
    pub fn new(store: Arc<dyn ResultStore>, targets: Vec<Target>) -> Self {
        Self { store, targets }
    }

    pub async fn snapshot(&self) -> Result<StatusReport> {
        self.snapshot_at(Utc::now()).await
    }

    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> Result<StatusReport> {
        let mut summary = StatusSummary { total_targets: self.targets.len(), ..Default::default() };
        let mut targets = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let status = self.target_status(target, now).await?;
            match status.status {
                HealthState::Healthy => summary.healthy_targets += 1,
                HealthState::Unhealthy => summary.unhealthy_targets += 1,
            }
            summary.total_active_alerts += status.active_alert_count;
            targets.push(status);
        }

        Ok(StatusReport { generated_at: now, summary, targets })
    }

    async fn target_status(&self, target: &Target, now: DateTime<Utc>) -> Result<TargetStatus> {
        let recent_checks = self.store.latest_checks(&target.name, RECENT_CHECKS).await?;
        let active_alerts = self.store.unresolved_alerts(&target.name).await?;
        let counts = self.store.check_counts(&target.name, now - Duration::hours(24)).await?;

        Ok(TargetStatus {
            name: target.name.clone(),
            url: target.url.clone(),
            status: health_state(&recent_checks),
            uptime_24h: (counts.uptime_percentage() * 100.0).round() / 100.0,
            active_alert_count: active_alerts.len(),
            recent_checks,
            active_alerts,
        })
    }

    /// Write a snapshot as pretty JSON, to `path` or a timestamped file in
    /// the working directory
    pub async fn export_report(&self, path: Option<&Path>) -> Result<PathBuf> {
        let report = self.snapshot().await?;
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(default_report_name(report.generated_at)));

        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        tracing::info!(path = %path.display(), "Status report exported");
        Ok(path)
    }
}

/// Healthy when the newest checks, of any kind, are all UP
fn health_state(newest_first: &[HealthCheck]) -> HealthState {
    let window = &newest_first[..newest_first.len().min(HEALTH_WINDOW)];
    if !window.is_empty() && window.iter().all(HealthCheck::is_up) {
        HealthState::Healthy
    } else {
        HealthState::Unhealthy
    }
}

pub fn default_report_name(at: DateTime<Utc>) -> String {
    format!("website_monitor_report_{}.json", at.format("%Y%m%d_%H%M%S"))
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Status at {}", self.generated_at.to_rfc3339())?;
        writeln!(
            f,
            "  Targets: {} ({} healthy, {} unhealthy)",
            self.summary.total_targets, self.summary.healthy_targets, self.summary.unhealthy_targets
        )?;
        writeln!(f, "  Active alerts: {}", self.summary.total_active_alerts)?;

        for target in &self.targets {
            let status = match target.status {
                HealthState::Healthy => "HEALTHY",
                HealthState::Unhealthy => "UNHEALTHY",
            };
            writeln!(f, "  {} [{}] {}", target.name, status, target.url)?;
            writeln!(f, "    Uptime (24h): {:.2}%", target.uptime_24h)?;
            if let Some(last) = target.recent_checks.first() {
                writeln!(f, "    Last check: {} {} ({:.2}s)", last.check_type, last.status, last.response_time)?;
            }
            for alert in &target.active_alerts {
                writeln!(f, "    [{}] {}: {}", alert.severity, alert.rule_name, alert.message)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rules::Severity;
    use crate::database::test_store;
    use crate::monitoring::testing::scripted_check;
    use crate::monitoring::types::{CheckStatus, CheckType};

    #[test]
    fn test_health_state() {
        let up = |t| scripted_check(t, CheckStatus::Up);
        let down = |t| scripted_check(t, CheckStatus::Down);

        assert_eq!(health_state(&[]), HealthState::Unhealthy);
        assert_eq!(health_state(&[up(CheckType::Http)]), HealthState::Healthy);
        assert_eq!(
            health_state(&[up(CheckType::Http), up(CheckType::Dns), up(CheckType::Ssl), down(CheckType::Http)]),
            HealthState::Healthy
        );
        assert_eq!(health_state(&[up(CheckType::Http), down(CheckType::Dns)]), HealthState::Unhealthy);
    }

    #[test]
    fn test_default_report_name() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T07:08:09Z").unwrap().with_timezone(&Utc);
        assert_eq!(default_report_name(at), "website_monitor_report_20240305_070809.json");
    }

    #[tokio::test]
    async fn test_snapshot() -> Result<()> {
        let (store, dir) = test_store().await?;
        let store = Arc::new(store);
        let now = Utc::now();

        for (i, status) in [CheckStatus::Down, CheckStatus::Up, CheckStatus::Up, CheckStatus::Up].into_iter().enumerate() {
            let check = scripted_check(CheckType::Http, status).at(now - Duration::minutes(10 - i as i64));
            store.record_check("web", &check).await?;
        }
        store.record_check("api", &scripted_check(CheckType::Http, CheckStatus::Down).at(now - Duration::minutes(1))).await?;
        store
            .record_alert(&Alert::new(now, "api", "HTTP_DOWN", Severity::Critical, "HTTP check failed: Status 500".into()))
            .await?;

        let targets = vec![
            Target::new("web", "https://example.com"),
            Target::new("api", "https://api.example.com"),
            Target::new("idle", "https://idle.example.com"),
        ];
        let reporter = StatusReporter::new(store, targets);
        let report = reporter.snapshot_at(now).await?;

        assert_eq!(
            report.summary,
            StatusSummary { total_targets: 3, healthy_targets: 1, unhealthy_targets: 2, total_active_alerts: 1 }
        );

        let web = &report.targets[0];
        assert_eq!(web.status, HealthState::Healthy);
        assert_eq!(web.uptime_24h, 75.0);
        assert_eq!(web.recent_checks.len(), 4);

        let api = &report.targets[1];
        assert_eq!(api.status, HealthState::Unhealthy);
        assert_eq!(api.active_alert_count, 1);

        let idle = &report.targets[2];
        assert_eq!(idle.status, HealthState::Unhealthy);
        assert_eq!(idle.uptime_24h, 0.0);

        let json = serde_json::to_value(&report)?;
        assert_eq!(json["targets"][0]["status"], "HEALTHY");

        let path = reporter.export_report(Some(&dir.path().join("report.json"))).await?;
        let exported: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        assert_eq!(exported["summary"]["total_targets"], 3);
        Ok(())
    }
}
