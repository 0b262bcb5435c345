use anyhow::Result;
use std::sync::Arc;

use super::checker::{Checker, DnsChecker, HttpChecker, TlsChecker};
use super::types::{CheckType, HealthCheck};
use crate::config::Target;

/// Monitoring executor - routes a (target, check type) pair to its checker
pub struct MonitoringExecutor {
    http_checker: Arc<dyn Checker>,
    tls_checker: Arc<dyn Checker>,
    dns_checker: Arc<dyn Checker>,
    response_time_warning: f64,
}

impl MonitoringExecutor {
    /// Create an executor with the network checkers
    pub fn new(response_time_warning: f64) -> Result<Self> {
        Ok(Self::with_checkers(
            Arc::new(HttpChecker::new()?),
            Arc::new(TlsChecker::new()?),
            Arc::new(DnsChecker::new()?),
            response_time_warning,
        ))
    }

    pub fn with_checkers(
        http_checker: Arc<dyn Checker>,
        tls_checker: Arc<dyn Checker>,
        dns_checker: Arc<dyn Checker>,
        response_time_warning: f64,
    ) -> Self {
        Self { http_checker, tls_checker, dns_checker, response_time_warning }
    }

    /// Execute a monitoring check
    pub async fn execute_check(&self, target: &Target, check_type: CheckType) -> HealthCheck {
        let checker: &dyn Checker = match check_type {
            CheckType::Http => self.http_checker.as_ref(),
            CheckType::Ssl => self.tls_checker.as_ref(),
            CheckType::Dns => self.dns_checker.as_ref(),
        };

        let check = checker.check(target).await;

        if check_type == CheckType::Http && check.is_up() && check.response_time > self.response_time_warning {
            tracing::warn!(
                target = %target.name,
                response_time = check.response_time,
                threshold = self.response_time_warning,
                "Slow HTTP response"
            );
        }

        check
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::testing::ScriptedChecker;
    use crate::monitoring::types::CheckStatus;

    #[tokio::test]
    async fn test_routes_by_check_type() {
        let http = Arc::new(ScriptedChecker::new(CheckType::Http, vec![CheckStatus::Down]));
        let tls = Arc::new(ScriptedChecker::new(CheckType::Ssl, vec![CheckStatus::Expired]));
        let dns = Arc::new(ScriptedChecker::new(CheckType::Dns, vec![CheckStatus::NxDomain]));
        let executor = MonitoringExecutor::with_checkers(http.clone(), tls.clone(), dns.clone(), 2.0);
        let target = Target::new("site", "https://example.com");

        assert_eq!(executor.execute_check(&target, CheckType::Ssl).await.status, CheckStatus::Expired);
        assert_eq!(executor.execute_check(&target, CheckType::Dns).await.status, CheckStatus::NxDomain);
        assert_eq!(executor.execute_check(&target, CheckType::Http).await.status, CheckStatus::Down);

        assert_eq!(http.calls(), 1);
        assert_eq!(tls.calls(), 1);
        assert_eq!(dns.calls(), 1);
    }
}
