use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

use super::NotificationChannel;
use crate::alerting::rules::Alert;
use crate::config::EmailSettings;
use crate::monitoring::types::HealthCheck;

const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// SMTP channel using STARTTLS
pub struct EmailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    pub fn new(settings: &EmailSettings) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.smtp_server)
            .with_context(|| format!("Invalid SMTP relay {}", settings.smtp_server))?
            .port(settings.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if !settings.username.is_empty() {
            builder = builder.credentials(Credentials::new(settings.username.clone(), settings.password.clone()));
        }

        let from = settings
            .from_address
            .parse()
            .with_context(|| format!("Invalid from address {}", settings.from_address))?;
        let to = settings
            .to_addresses
            .iter()
            .map(|address| address.parse().with_context(|| format!("Invalid recipient {address}")))
            .collect::<Result<Vec<Mailbox>>>()?;

        if to.is_empty() {
            anyhow::bail!("Email channel needs at least one recipient");
        }

        Ok(Self { transport: builder.build(), from, to })
    }

    fn subject(alert: &Alert) -> String {
        format!("[{}] Website Monitor Alert: {}", alert.severity, alert.target)
    }

    fn format_body(alert: &Alert, check: &HealthCheck) -> String {
        let status_code = check.status_code().map(|c| c.to_string()).unwrap_or_else(|| "N/A".into());
        format!(
            "Website Monitor Alert\n\n\
             Target: {target}\n\
             Alert Type: {rule}\n\
             Severity: {severity}\n\
             Timestamp: {timestamp}\n\n\
             Message: {message}\n\n\
             Check Details:\n\
             - Type: {check_type}\n\
             - Endpoint: {endpoint}\n\
             - Status: {status}\n\
             - Response Time: {response_time:.2}s\n\
             - Status Code: {status_code}\n\
             - Error: {error}\n",
            target = alert.target,
            rule = alert.rule_name,
            severity = alert.severity,
            timestamp = check.timestamp.to_rfc3339(),
            message = alert.message,
            check_type = check.check_type,
            endpoint = check.endpoint,
            status = check.status,
            response_time = check.response_time,
            status_code = status_code,
            error = check.error.as_deref().unwrap_or("None"),
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, alert: &Alert, check: &HealthCheck) -> Result<()> {
        let mut builder = Message::builder().from(self.from.clone()).subject(Self::subject(alert));
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        let email = builder.header(ContentType::TEXT_PLAIN).body(Self::format_body(alert, check))?;

        self.transport.send(email).await.context("SMTP delivery failed")?;
        Ok(())
    }
}
