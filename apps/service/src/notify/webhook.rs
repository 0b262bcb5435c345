use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use std::time::Duration;

use super::NotificationChannel;
use crate::alerting::rules::Alert;
use crate::config::WebhookSettings;
use crate::monitoring::types::HealthCheck;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts a JSON document describing the alert to a configured URL
pub struct WebhookChannel {
    client: Client,
    url: url::Url,
    method: Method,
}

impl WebhookChannel {
    pub fn new(settings: &WebhookSettings) -> Result<Self> {
        let url = url::Url::parse(&settings.url).with_context(|| format!("Invalid webhook URL {}", settings.url))?;
        let method = Method::from_bytes(settings.method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid webhook method {}", settings.method))?;
        let client = Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;

        Ok(Self { client, url, method })
    }

    fn payload(alert: &Alert, check: &HealthCheck) -> Value {
        json!({
            "target": alert.target,
            "alert_type": alert.rule_name,
            "severity": alert.severity,
            "message": alert.message,
            "timestamp": alert.timestamp.to_rfc3339(),
            "check_details": check,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert, check: &HealthCheck) -> Result<()> {
        let response = self
            .client
            .request(self.method.clone(), self.url.clone())
            .json(&Self::payload(alert, check))
            .send()
            .await
            .context("Webhook request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Webhook returned {status}");
        }
        Ok(())
    }
}
