use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::monitoring::types::{CheckType, HealthCheck};

/// Condition category a rule evaluates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCondition {
    /// HTTP status differs from the target's expected status
    HttpStatus,
    /// Certificate expires within `threshold` days
    SslExpiry,
    /// Response time above `threshold` seconds
    ResponseTime,
    /// DNS resolution did not succeed
    DnsFailure,
}

impl RuleCondition {
    /// Check type whose stream this condition is evaluated against
    pub fn check_type(&self) -> CheckType {
        match self {
            RuleCondition::HttpStatus | RuleCondition::ResponseTime => CheckType::Http,
            RuleCondition::SslExpiry => CheckType::Ssl,
            RuleCondition::DnsFailure => CheckType::Dns,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(anyhow::anyhow!("Unknown severity: {other}")),
        }
    }
}

/// Named condition plus hysteresis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub condition: RuleCondition,
    pub threshold: f64,
    pub consecutive_failures: u32,
    pub cooldown_minutes: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AlertRule {
    pub fn new(
        name: &str,
        condition: RuleCondition,
        threshold: f64,
        consecutive_failures: u32,
        cooldown_minutes: u32,
    ) -> Self {
        Self {
            name: name.to_string(),
            condition,
            threshold,
            consecutive_failures,
            cooldown_minutes,
            enabled: true,
        }
    }

    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cooldown_minutes))
    }

    /// Whether this rule looks at checks of the given type
    pub fn applies_to(&self, check_type: CheckType) -> bool {
        self.enabled && self.condition.check_type() == check_type
    }

    /// Evaluate the condition against a single check.
    ///
    /// Returns the alert message when the condition holds.
    pub fn evaluate(&self, check: &HealthCheck) -> Option<String> {
        if !self.applies_to(check.check_type) {
            return None;
        }

        match self.condition {
            RuleCondition::HttpStatus => check.status.is_failure().then(|| {
                let reason = match (&check.error, check.status_code()) {
                    (Some(error), _) => error.clone(),
                    (None, Some(code)) => format!("Status {code}"),
                    (None, None) => format!("Status {}", check.status),
                };
                format!("HTTP check failed: {reason}")
            }),
            RuleCondition::SslExpiry => {
                let days = check.days_until_expiry()?;
                (days as f64 <= self.threshold)
                    .then(|| format!("SSL certificate expires in {days} days"))
            }
            RuleCondition::ResponseTime => (check.response_time > self.threshold).then(|| {
                format!(
                    "High response time: {:.2}s (threshold: {}s)",
                    check.response_time, self.threshold
                )
            }),
            RuleCondition::DnsFailure => check.status.is_failure().then(|| {
                format!(
                    "DNS resolution failed: {}",
                    check.error.as_deref().unwrap_or(check.status.as_str())
                )
            }),
        }
    }

    /// Severity of an alert fired by this rule for `check`
    pub fn severity(&self, check: &HealthCheck, response_time_critical: f64) -> Severity {
        match self.condition {
            RuleCondition::HttpStatus | RuleCondition::DnsFailure => Severity::Critical,
            RuleCondition::SslExpiry => match check.days_until_expiry() {
                Some(days) if days <= 1 => Severity::Critical,
                Some(_) => Severity::Warning,
                None => Severity::Info,
            },
            RuleCondition::ResponseTime => {
                if check.response_time > response_time_critical {
                    Severity::Critical
                } else {
                    Severity::Warning
                }
            }
        }
    }
}

/// The four rules used when the configuration does not override them
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new("HTTP_DOWN", RuleCondition::HttpStatus, 1.0, 3, 5),
        AlertRule::new("SSL_EXPIRING", RuleCondition::SslExpiry, 7.0, 1, 60),
        AlertRule::new("HIGH_RESPONSE_TIME", RuleCondition::ResponseTime, 5.0, 5, 15),
        AlertRule::new("DNS_FAILURE", RuleCondition::DnsFailure, 1.0, 2, 10),
    ]
}

/// A fired alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub rule_name: String,
    pub severity: Severity,
    pub message: String,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn new(
        timestamp: DateTime<Utc>,
        target: &str,
        rule_name: &str,
        severity: Severity,
        message: String,
    ) -> Self {
        Self {
            id: None,
            timestamp,
            target: target.to_string(),
            rule_name: rule_name.to_string(),
            severity,
            message,
            resolved: false,
            resolved_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::types::{CheckDetail, CheckStatus, TlsDetail};

    fn tls_check(days: i64) -> HealthCheck {
        HealthCheck::new(CheckType::Ssl, "example.com:443").completed(
            CheckStatus::Up,
            0.1,
            CheckDetail::Tls(TlsDetail {
                subject: "CN=example.com".into(),
                issuer: "CN=Test CA".into(),
                not_after: Utc::now() + chrono::Duration::days(days),
                days_until_expiry: days,
                serial_number: "01".into(),
                version: 3,
            }),
        )
    }

    fn rule(name: &str) -> AlertRule {
        default_rules().into_iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_default_rules() {
        let rules = default_rules();
        assert_eq!(rules.len(), 4);
        let http = rule("HTTP_DOWN");
        assert_eq!((http.consecutive_failures, http.cooldown_minutes), (3, 5));
        let dns = rule("DNS_FAILURE");
        assert_eq!((dns.consecutive_failures, dns.cooldown_minutes), (2, 10));
        assert!(rules.iter().all(|r| r.enabled));
    }

    #[test]
    fn test_ssl_expiry_severity() {
        let ssl = rule("SSL_EXPIRING");

        let check = tls_check(5);
        assert_eq!(ssl.evaluate(&check).as_deref(), Some("SSL certificate expires in 5 days"));
        assert_eq!(ssl.severity(&check, 5.0), Severity::Warning);

        let check = tls_check(0);
        assert!(ssl.evaluate(&check).is_some());
        assert_eq!(ssl.severity(&check, 5.0), Severity::Critical);

        assert!(ssl.evaluate(&tls_check(8)).is_none());
    }

    #[test]
    fn test_ssl_rule_ignores_failed_handshake() {
        let check = HealthCheck::new(CheckType::Ssl, "example.com:443")
            .failed(CheckStatus::Error, 0.0, "handshake failed");
        assert!(rule("SSL_EXPIRING").evaluate(&check).is_none());
    }

    #[test]
    fn test_http_rule_message() {
        let check = HealthCheck::new(CheckType::Http, "https://example.com")
            .failed(CheckStatus::Timeout, 10.0, "Request timed out");
        assert_eq!(
            rule("HTTP_DOWN").evaluate(&check).as_deref(),
            Some("HTTP check failed: Request timed out")
        );
        // HTTP rules never look at DNS checks
        let dns = HealthCheck::new(CheckType::Dns, "example.com")
            .failed(CheckStatus::NxDomain, 0.0, "Domain does not exist");
        assert!(rule("HTTP_DOWN").evaluate(&dns).is_none());
    }

    #[test]
    fn test_response_time_severity() {
        let slow = rule("HIGH_RESPONSE_TIME");
        let mut check = HealthCheck::new(CheckType::Http, "https://example.com")
            .failed(CheckStatus::Timeout, 6.0, "Request timed out");
        assert_eq!(
            slow.evaluate(&check).as_deref(),
            Some("High response time: 6.00s (threshold: 5s)")
        );
        assert_eq!(slow.severity(&check, 8.0), Severity::Warning);
        assert_eq!(slow.severity(&check, 5.0), Severity::Critical);

        check.response_time = 5.0;
        assert!(slow.evaluate(&check).is_none());
    }

    #[test]
    fn test_disabled_rule_never_matches() {
        let mut dns = rule("DNS_FAILURE");
        dns.enabled = false;
        let check = HealthCheck::new(CheckType::Dns, "example.com")
            .failed(CheckStatus::Error, 0.0, "no answer");
        assert!(dns.evaluate(&check).is_none());
    }
}
