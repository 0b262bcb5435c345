use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Convert a timestamp to the stored representation (Unix milliseconds)
pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert a stored Unix-millisecond value back to a timestamp
pub fn i64_to_timestamp(millis: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow::anyhow!("Stored timestamp out of range: {millis}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    AvgResponseTime,
    UptimePercentage,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::AvgResponseTime => "avg_response_time",
            MetricType::UptimePercentage => "uptime_percentage",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg_response_time" => Ok(MetricType::AvgResponseTime),
            "uptime_percentage" => Ok(MetricType::UptimePercentage),
            other => Err(anyhow::anyhow!("Unknown metric type: {other}")),
        }
    }
}

/// Rolled-up value for one target over one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetric {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub target: String,
    pub metric_type: MetricType,
    pub value: f64,
    pub period: String,
}

impl PerformanceMetric {
    pub fn hourly(timestamp: DateTime<Utc>, target: &str, metric_type: MetricType, value: f64) -> Self {
        Self {
            id: None,
            timestamp,
            target: target.to_string(),
            metric_type,
            value,
            period: "hourly".to_string(),
        }
    }
}

/// Rows removed by one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub health_checks: u64,
    pub alerts: u64,
    pub performance_metrics: u64,
}

impl PruneStats {
    pub fn total(&self) -> u64 {
        self.health_checks + self.alerts + self.performance_metrics
    }
}

/// Most recent alert time for a (target, rule) pair
#[derive(Debug, Clone, PartialEq)]
pub struct LastAlert {
    pub target: String,
    pub rule_name: String,
    pub timestamp: DateTime<Utc>,
}
