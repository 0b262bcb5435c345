use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::cooldown::CooldownTracker;
use super::rules::{Alert, AlertRule};
use crate::database::ResultStore;
use crate::monitoring::types::HealthCheck;
use crate::notify::NotificationDispatcher;

/// Turns health checks into alerts.
///
/// A rule fires when its condition holds on the current check, the last
/// `consecutive_failures` checks of the same type for the target all failed,
/// and the (target, rule) pair is outside its cooldown. Every fired alert is
/// persisted before it is handed to the notification channels.
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    store: Arc<dyn ResultStore>,
    dispatcher: Arc<NotificationDispatcher>,
    cooldowns: CooldownTracker,
    response_time_critical: f64,
}

impl AlertEngine {
    pub fn new(
        rules: Vec<AlertRule>,
        store: Arc<dyn ResultStore>,
        dispatcher: Arc<NotificationDispatcher>,
        response_time_critical: f64,
    ) -> Self {
        Self { rules, store, dispatcher, cooldowns: CooldownTracker::new(), response_time_critical }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Seed cooldowns from alerts persisted by a previous run
    pub async fn restore_cooldowns(&self) -> Result<usize> {
        let restored = self.cooldowns.seed(self.store.last_alert_times().await?);
        debug!(restored, "Restored alert cooldowns");
        Ok(restored)
    }

    pub async fn evaluate(&self, target: &str, check: &HealthCheck) -> Result<Vec<Alert>> {
        self.evaluate_at(target, check, Utc::now()).await
    }

    /// Evaluate every applicable rule against `check`, which must already be
    /// recorded in the store.
    ///
    /// A store failure on one rule does not stop the others; the first such
    /// error is returned once every rule has been evaluated.
    pub async fn evaluate_at(&self, target: &str, check: &HealthCheck, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let mut fired = Vec::new();
        let mut first_error = None;

        for rule in self.rules.iter().filter(|r| r.applies_to(check.check_type)) {
            match self.evaluate_rule(target, rule, check, now).await {
                Ok(Some(alert)) => fired.push(alert),
                Ok(None) => {}
                Err(e) => {
                    error!(target, rule = %rule.name, error = %e, "Alert evaluation failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(fired),
        }
    }

    async fn evaluate_rule(
        &self,
        target: &str,
        rule: &AlertRule,
        check: &HealthCheck,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>> {
        let Some(message) = rule.evaluate(check) else {
            return Ok(None);
        };

        if !self.failure_streak_reached(target, rule, check).await? {
            debug!(target, rule = %rule.name, "Condition holds but failure streak is too short");
            return Ok(None);
        }

        let Some(claim) = self.cooldowns.try_claim(target, &rule.name, rule.cooldown(), now) else {
            debug!(target, rule = %rule.name, "Alert suppressed by cooldown");
            return Ok(None);
        };

        let mut alert = Alert::new(now, target, &rule.name, rule.severity(check, self.response_time_critical), message);
        alert.id = match self.store.record_alert(&alert).await {
            Ok(id) => Some(id),
            Err(e) => {
                // Nothing was stored or sent, so the next occurrence may fire
                self.cooldowns.release(target, &rule.name, claim);
                return Err(e);
            }
        };

        warn!(
            target,
            rule = %alert.rule_name,
            severity = %alert.severity,
            message = %alert.message,
            "Alert fired"
        );

        let summary = self.dispatcher.dispatch(&alert, check).await;
        if summary.failed > 0 {
            info!(target, rule = %alert.rule_name, failed = summary.failed, "Alert persisted but some notifications failed");
        }

        Ok(Some(alert))
    }

    /// A single-check rule always passes; otherwise the newest N checks of
    /// the same type must all be failures.
    async fn failure_streak_reached(&self, target: &str, rule: &AlertRule, check: &HealthCheck) -> Result<bool> {
        let required = rule.consecutive_failures as usize;
        if required <= 1 {
            return Ok(true);
        }

        let recent = self.store.recent_checks(target, check.check_type, required).await?;
        Ok(recent.len() >= required && recent.iter().all(|c| c.status.is_failure()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::rules::{RuleCondition, Severity, default_rules};
    use crate::database::models::{LastAlert, PerformanceMetric, PruneStats};
    use crate::database::{CheckCounts, LibsqlStore, test_store};
    use crate::monitoring::testing::scripted_check;
    use crate::monitoring::types::{CheckDetail, CheckStatus, CheckType, TlsDetail};
    use crate::notify::NotificationChannel;
    use crate::notify::testing::RecordingChannel;
    use chrono::Duration;

    struct Harness {
        engine: AlertEngine,
        store: Arc<LibsqlStore>,
        channel: Arc<RecordingChannel>,
        _dir: tempfile::TempDir,
    }

    async fn harness(rules: Vec<AlertRule>) -> Harness {
        let (store, dir) = test_store().await.unwrap();
        let store = Arc::new(store);
        let channel = Arc::new(RecordingChannel::new("recording", false));
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];
        let engine = AlertEngine::new(rules, store.clone(), Arc::new(NotificationDispatcher::new(channels)), 10.0);
        Harness { engine, store, channel, _dir: dir }
    }

    /// Record then evaluate, the way the scheduler does
    async fn observe(h: &Harness, target: &str, check: HealthCheck, now: DateTime<Utc>) -> Vec<Alert> {
        h.store.record_check(target, &check).await.unwrap();
        h.engine.evaluate_at(target, &check, now).await.unwrap()
    }

    fn http(status: CheckStatus, at: DateTime<Utc>) -> HealthCheck {
        scripted_check(CheckType::Http, status).at(at)
    }

    #[tokio::test]
    async fn test_http_down_needs_three_consecutive_failures() {
        let h = harness(default_rules()).await;
        let t0 = Utc::now();

        assert!(observe(&h, "site", http(CheckStatus::Down, t0), t0).await.is_empty());
        assert!(observe(&h, "site", http(CheckStatus::Down, t0 + Duration::seconds(60)), t0 + Duration::seconds(60)).await.is_empty());

        let fired = observe(&h, "site", http(CheckStatus::Down, t0 + Duration::seconds(120)), t0 + Duration::seconds(120)).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_name, "HTTP_DOWN");
        assert_eq!(fired[0].severity, Severity::Critical);
        assert!(fired[0].id.is_some());
        assert_eq!(h.channel.count(), 1);

        // Fourth failure a minute later is inside the 5 minute cooldown
        let fired = observe(&h, "site", http(CheckStatus::Down, t0 + Duration::seconds(180)), t0 + Duration::seconds(180)).await;
        assert!(fired.is_empty());

        let stored = h.store.unresolved_alerts("site").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(h.channel.count(), 1);
    }

    #[tokio::test]
    async fn test_intervening_success_breaks_streak() {
        let h = harness(default_rules()).await;
        let t0 = Utc::now();

        for (i, status) in [CheckStatus::Down, CheckStatus::Down, CheckStatus::Up, CheckStatus::Down, CheckStatus::Down]
            .into_iter()
            .enumerate()
        {
            let at = t0 + Duration::seconds(60 * i as i64);
            assert!(observe(&h, "site", http(status, at), at).await.is_empty());
        }

        let at = t0 + Duration::seconds(300);
        assert_eq!(observe(&h, "site", http(CheckStatus::Down, at), at).await.len(), 1);
    }

    #[tokio::test]
    async fn test_expiring_certificate_fires_once_per_cooldown() {
        let h = harness(default_rules()).await;
        let t0 = Utc::now();
        let tls = |at: DateTime<Utc>| {
            HealthCheck::new(CheckType::Ssl, "example.com:443").at(at).completed(
                CheckStatus::Up,
                0.1,
                CheckDetail::Tls(TlsDetail {
                    subject: "CN=example.com".into(),
                    issuer: "CN=Test CA".into(),
                    not_after: at + Duration::days(5),
                    days_until_expiry: 5,
                    serial_number: "01".into(),
                    version: 3,
                }),
            )
        };

        let fired = observe(&h, "site", tls(t0), t0).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_name, "SSL_EXPIRING");
        assert_eq!(fired[0].severity, Severity::Warning);
        assert_eq!(fired[0].message, "SSL certificate expires in 5 days");

        let later = t0 + Duration::minutes(10);
        assert!(observe(&h, "site", tls(later), later).await.is_empty());

        let after_cooldown = t0 + Duration::minutes(61);
        assert_eq!(observe(&h, "site", tls(after_cooldown), after_cooldown).await.len(), 1);
    }

    #[tokio::test]
    async fn test_dns_failure_after_two_nxdomain() {
        let h = harness(default_rules()).await;
        let t0 = Utc::now();
        let dns = |at| scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(at);

        assert!(observe(&h, "api", dns(t0), t0).await.is_empty());
        let at = t0 + Duration::seconds(30);
        let fired = observe(&h, "api", dns(at), at).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_name, "DNS_FAILURE");
        assert_eq!(fired[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_targets_do_not_share_streaks_or_cooldowns() {
        let rule = AlertRule::new("HTTP_DOWN", RuleCondition::HttpStatus, 1.0, 2, 5);
        let h = harness(vec![rule]).await;
        let t0 = Utc::now();

        observe(&h, "a", http(CheckStatus::Down, t0), t0).await;
        assert!(observe(&h, "b", http(CheckStatus::Down, t0), t0).await.is_empty());

        let at = t0 + Duration::seconds(60);
        assert_eq!(observe(&h, "a", http(CheckStatus::Down, at), at).await.len(), 1);
        assert_eq!(observe(&h, "b", http(CheckStatus::Down, at), at).await.len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_rule_never_fires() {
        let mut rule = AlertRule::new("DNS_FAILURE", RuleCondition::DnsFailure, 1.0, 1, 10);
        rule.enabled = false;
        let h = harness(vec![rule]).await;
        let now = Utc::now();

        let check = scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(now);
        assert!(observe(&h, "api", check, now).await.is_empty());
    }

    #[tokio::test]
    async fn test_restored_cooldown_suppresses_refire() {
        let rule = AlertRule::new("DNS_FAILURE", RuleCondition::DnsFailure, 1.0, 1, 10);
        let h = harness(vec![rule.clone()]).await;
        let now = Utc::now();

        let previous = Alert::new(now - Duration::minutes(3), "api", "DNS_FAILURE", Severity::Critical, "nx".into());
        h.store.record_alert(&previous).await.unwrap();

        let restarted = AlertEngine::new(
            vec![rule],
            h.store.clone(),
            Arc::new(NotificationDispatcher::default()),
            10.0,
        );
        assert_eq!(restarted.restore_cooldowns().await.unwrap(), 1);

        let check = scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(now);
        h.store.record_check("api", &check).await.unwrap();
        assert!(restarted.evaluate_at("api", &check, now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_evaluation_fires_once() {
        let rule = AlertRule::new("DNS_FAILURE", RuleCondition::DnsFailure, 1.0, 1, 10);
        let h = Arc::new(harness(vec![rule]).await);
        let now = Utc::now();
        let check = scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(now);
        h.store.record_check("api", &check).await.unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let h = Arc::clone(&h);
                let check = check.clone();
                tokio::spawn(async move { h.engine.evaluate_at("api", &check, now).await.unwrap().len() })
            })
            .collect();

        let mut total = 0;
        for task in tasks {
            total += task.await.unwrap();
        }
        assert_eq!(total, 1);
        assert_eq!(h.store.unresolved_alerts("api").await.unwrap().len(), 1);
    }

    /// Delegates to a real store, failing the next `record_alert` calls
    struct FailingAlertStore {
        inner: LibsqlStore,
        failures_left: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ResultStore for FailingAlertStore {
        async fn record_check(&self, target: &str, check: &HealthCheck) -> Result<i64> {
            self.inner.record_check(target, check).await
        }

        async fn recent_checks(&self, target: &str, check_type: CheckType, limit: usize) -> Result<Vec<HealthCheck>> {
            self.inner.recent_checks(target, check_type, limit).await
        }

        async fn latest_checks(&self, target: &str, limit: usize) -> Result<Vec<HealthCheck>> {
            self.inner.latest_checks(target, limit).await
        }

        async fn checks_between(&self, target: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<HealthCheck>> {
            self.inner.checks_between(target, from, to).await
        }

        async fn check_counts(&self, target: &str, since: DateTime<Utc>) -> Result<CheckCounts> {
            self.inner.check_counts(target, since).await
        }

        async fn record_alert(&self, alert: &Alert) -> Result<i64> {
            use std::sync::atomic::Ordering;
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                anyhow::bail!("disk full");
            }
            self.inner.record_alert(alert).await
        }

        async fn unresolved_alerts(&self, target: &str) -> Result<Vec<Alert>> {
            self.inner.unresolved_alerts(target).await
        }

        async fn recent_alerts(&self, target: &str, limit: usize) -> Result<Vec<Alert>> {
            self.inner.recent_alerts(target, limit).await
        }

        async fn resolve_alert(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
            self.inner.resolve_alert(id, at).await
        }

        async fn last_alert_times(&self) -> Result<Vec<LastAlert>> {
            self.inner.last_alert_times().await
        }

        async fn record_metric(&self, metric: &PerformanceMetric) -> Result<i64> {
            self.inner.record_metric(metric).await
        }

        async fn metrics_between(&self, target: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<PerformanceMetric>> {
            self.inner.metrics_between(target, from, to).await
        }

        async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<PruneStats> {
            self.inner.prune_older_than(cutoff).await
        }
    }

    #[tokio::test]
    async fn test_failed_alert_write_does_not_start_cooldown() {
        let (inner, _dir) = test_store().await.unwrap();
        let store = Arc::new(FailingAlertStore { inner, failures_left: std::sync::atomic::AtomicUsize::new(1) });
        let channel = Arc::new(RecordingChannel::new("recording", false));
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![channel.clone()];
        let rule = AlertRule::new("DNS_FAILURE", RuleCondition::DnsFailure, 1.0, 1, 10);
        let engine = AlertEngine::new(vec![rule], store.clone(), Arc::new(NotificationDispatcher::new(channels)), 10.0);
        let t0 = Utc::now();

        let check = scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(t0);
        store.record_check("api", &check).await.unwrap();
        let err = engine.evaluate_at("api", &check, t0).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(channel.count(), 0);
        assert_eq!(engine.cooldowns.last_fired("api", "DNS_FAILURE"), None);

        let at = t0 + Duration::minutes(1);
        let check = scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(at);
        store.record_check("api", &check).await.unwrap();
        let fired = engine.evaluate_at("api", &check, at).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(store.unresolved_alerts("api").await.unwrap().len(), 1);
        assert_eq!(channel.count(), 1);
    }

    #[tokio::test]
    async fn test_failed_alert_write_does_not_skip_other_rules() {
        let (inner, _dir) = test_store().await.unwrap();
        let store = Arc::new(FailingAlertStore { inner, failures_left: std::sync::atomic::AtomicUsize::new(1) });
        let rules = vec![
            AlertRule::new("DNS_FAILURE", RuleCondition::DnsFailure, 1.0, 1, 10),
            AlertRule::new("DNS_FAILURE_PAGE", RuleCondition::DnsFailure, 1.0, 1, 10),
        ];
        let engine = AlertEngine::new(rules, store.clone(), Arc::new(NotificationDispatcher::default()), 10.0);
        let now = Utc::now();

        let check = scripted_check(CheckType::Dns, CheckStatus::NxDomain).at(now);
        store.record_check("api", &check).await.unwrap();
        assert!(engine.evaluate_at("api", &check, now).await.is_err());

        let stored = store.unresolved_alerts("api").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].rule_name, "DNS_FAILURE_PAGE");
    }
}
