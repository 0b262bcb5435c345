use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of probe run against a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Http,
    Ssl,
    Dns,
}

impl CheckType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Http => "HTTP",
            CheckType::Ssl => "SSL",
            CheckType::Dns => "DNS",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(CheckType::Http),
            "SSL" | "TLS" => Ok(CheckType::Ssl),
            "DNS" => Ok(CheckType::Dns),
            other => Err(anyhow::anyhow!("Unknown check type: {other}")),
        }
    }
}

/// Terminal status of a single probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Up,
    Down,
    Timeout,
    ConnectionError,
    Error,
    Expired,
    #[serde(rename = "NXDOMAIN")]
    NxDomain,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Up => "UP",
            CheckStatus::Down => "DOWN",
            CheckStatus::Timeout => "TIMEOUT",
            CheckStatus::ConnectionError => "CONNECTION_ERROR",
            CheckStatus::Error => "ERROR",
            CheckStatus::Expired => "EXPIRED",
            CheckStatus::NxDomain => "NXDOMAIN",
        }
    }

    /// Every status except UP counts against the consecutive-failure window.
    pub fn is_failure(&self) -> bool {
        !matches!(self, CheckStatus::Up)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(CheckStatus::Up),
            "DOWN" => Ok(CheckStatus::Down),
            "TIMEOUT" => Ok(CheckStatus::Timeout),
            "CONNECTION_ERROR" => Ok(CheckStatus::ConnectionError),
            "ERROR" => Ok(CheckStatus::Error),
            "EXPIRED" => Ok(CheckStatus::Expired),
            "NXDOMAIN" => Ok(CheckStatus::NxDomain),
            other => Err(anyhow::anyhow!("Unknown check status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpDetail {
    pub status_code: u16,
    pub final_url: String,
    pub redirects: u32,
    pub content_length: u64,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsDetail {
    pub subject: String,
    pub issuer: String,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub serial_number: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsDetail {
    pub hostname: String,
    pub ip_addresses: Vec<String>,
    pub ttl: u64,
    pub record_count: usize,
}

/// Kind-specific payload of a completed probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CheckDetail {
    Http(HttpDetail),
    Tls(TlsDetail),
    Dns(DnsDetail),
}

/// Result of one probe for a (target, check type) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// When the probe started
    pub timestamp: DateTime<Utc>,

    pub check_type: CheckType,

    /// URL, `host:port` or hostname depending on the check type
    pub endpoint: String,

    pub status: CheckStatus,

    /// Seconds spent on the probe
    pub response_time: f64,

    /// Error message (if the probe did not complete)
    pub error: Option<String>,

    pub detail: Option<CheckDetail>,
}

impl HealthCheck {
    /// Create a pending check; the status is replaced by `completed` or `failed`
    pub fn new(check_type: CheckType, endpoint: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            check_type,
            endpoint: endpoint.into(),
            status: CheckStatus::Error,
            response_time: 0.0,
            error: None,
            detail: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Mark the probe as completed with a kind-specific payload
    pub fn completed(mut self, status: CheckStatus, response_time: f64, detail: CheckDetail) -> Self {
        self.status = status;
        self.response_time = response_time;
        self.detail = Some(detail);
        self
    }

    /// Mark the probe as failed before any payload was captured
    pub fn failed(mut self, status: CheckStatus, response_time: f64, error: impl Into<String>) -> Self {
        self.status = status;
        self.response_time = response_time;
        self.error = Some(error.into());
        self
    }

    pub fn is_up(&self) -> bool {
        self.status == CheckStatus::Up
    }

    pub fn status_code(&self) -> Option<u16> {
        match &self.detail {
            Some(CheckDetail::Http(http)) => Some(http.status_code),
            _ => None,
        }
    }

    pub fn days_until_expiry(&self) -> Option<i64> {
        match &self.detail {
            Some(CheckDetail::Tls(tls)) => Some(tls.days_until_expiry),
            _ => None,
        }
    }
}
