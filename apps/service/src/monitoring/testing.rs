//! Scripted checkers for tests that must not touch the network.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::checker::Checker;
use super::types::{CheckDetail, CheckStatus, CheckType, HealthCheck, HttpDetail};
use crate::config::Target;

/// Replays a fixed sequence of checks, repeating the last one
pub struct ScriptedChecker {
    script: Mutex<Vec<HealthCheck>>,
    calls: AtomicUsize,
}

impl ScriptedChecker {
    pub fn new(check_type: CheckType, statuses: Vec<CheckStatus>) -> Self {
        let checks = statuses.into_iter().map(|status| scripted_check(check_type, status)).collect();
        Self::from_checks(checks)
    }

    pub fn from_checks(checks: Vec<HealthCheck>) -> Self {
        assert!(!checks.is_empty(), "script needs at least one check");
        Self { script: Mutex::new(checks), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, _target: &Target) -> HealthCheck {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap();
        let template = script.get(index).unwrap_or_else(|| script.last().unwrap());
        template.clone().at(chrono::Utc::now())
    }
}

/// A check of the given type and status, with an HTTP payload when it applies
pub fn scripted_check(check_type: CheckType, status: CheckStatus) -> HealthCheck {
    let check = HealthCheck::new(check_type, "scripted");
    match (check_type, status) {
        (CheckType::Http, CheckStatus::Up | CheckStatus::Down) => {
            let status_code = if status == CheckStatus::Up { 200 } else { 500 };
            check.completed(
                status,
                0.1,
                CheckDetail::Http(HttpDetail {
                    status_code,
                    final_url: "https://example.com/".into(),
                    redirects: 0,
                    content_length: 0,
                    headers: BTreeMap::new(),
                }),
            )
        }
        (_, CheckStatus::Up) => {
            let mut check = check.failed(CheckStatus::Up, 0.1, "");
            check.error = None;
            check
        }
        _ => check.failed(status, 0.0, format!("scripted {status}")),
    }
}
