//! Alert fan-out to notification channels.
//!
//! Delivery is best effort: a channel that fails is logged and skipped, and
//! never affects the other channels or anything already persisted.

pub mod email;
pub mod webhook;

pub use email::EmailChannel;
pub use webhook::WebhookChannel;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alerting::rules::Alert;
use crate::config::Notifications;
use crate::monitoring::types::HealthCheck;

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one alert together with the check that triggered it
    async fn send(&self, alert: &Alert, check: &HealthCheck) -> Result<()>;
}

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Default)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    /// Build the enabled channels from configuration
    pub fn from_settings(settings: &Notifications) -> Result<Self> {
        let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

        if settings.email.enabled {
            channels.push(Arc::new(EmailChannel::new(&settings.email)?));
        }
        if settings.webhook.enabled {
            channels.push(Arc::new(WebhookChannel::new(&settings.webhook)?));
        }

        info!(channels = channels.len(), "Notification channels configured");
        Ok(Self::new(channels))
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Send `alert` to every channel concurrently
    pub async fn dispatch(&self, alert: &Alert, check: &HealthCheck) -> DispatchSummary {
        let sends = self.channels.iter().map(|channel| async move {
            match channel.send(alert, check).await {
                Ok(()) => {
                    info!(channel = channel.name(), target = %alert.target, rule = %alert.rule_name, "Alert notification sent");
                    true
                }
                Err(e) => {
                    warn!(channel = channel.name(), target = %alert.target, rule = %alert.rule_name, error = %e, "Alert notification failed");
                    false
                }
            }
        });

        let results = join_all(sends).await;
        let delivered = results.iter().filter(|ok| **ok).count();
        let summary = DispatchSummary { delivered, failed: results.len() - delivered };
        debug!(?summary, "Alert dispatch finished");
        summary
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingChannel;
    use super::*;
    use crate::alerting::rules::Severity;
    use crate::monitoring::types::{CheckStatus, CheckType};
    use chrono::Utc;

    #[tokio::test]
    async fn test_failing_channel_does_not_block_others() {
        let broken = Arc::new(RecordingChannel::new("broken", true));
        let healthy = Arc::new(RecordingChannel::new("healthy", false));
        let dispatcher = NotificationDispatcher::new(vec![broken.clone(), healthy.clone()]);

        let alert = Alert::new(Utc::now(), "site", "HTTP_DOWN", Severity::Critical, "down".into());
        let check = HealthCheck::new(CheckType::Http, "https://example.com").failed(CheckStatus::Down, 0.2, "500");

        let summary = dispatcher.dispatch(&alert, &check).await;
        assert_eq!(summary, DispatchSummary { delivered: 1, failed: 1 });
        assert_eq!(broken.count(), 1);
        assert_eq!(healthy.count(), 1);
    }

    #[tokio::test]
    async fn test_no_channels() {
        let dispatcher = NotificationDispatcher::from_settings(&Notifications::default()).unwrap();
        assert!(dispatcher.channel_names().is_empty());

        let alert = Alert::new(Utc::now(), "site", "DNS_FAILURE", Severity::Critical, "nx".into());
        let check = HealthCheck::new(CheckType::Dns, "example.com").failed(CheckStatus::NxDomain, 0.0, "nx");
        assert_eq!(dispatcher.dispatch(&alert, &check).await, DispatchSummary::default());
    }
}
