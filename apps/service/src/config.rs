use std::collections::HashSet;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::alerting::rules::{AlertRule, default_rules};
use crate::monitoring::types::CheckType;
use crate::validation;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("Failed to write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("No config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: path::PathBuf,
    pub retention_days: u32,
    pub targets: Vec<Target>,
    pub alert_rules: Vec<AlertRule>,
    pub notifications: Notifications,
    pub performance_thresholds: PerformanceThresholds,
}

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    #[serde(default = "default_checks")]
    pub checks: Vec<CheckType>,
}

fn default_check_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    10
}

fn default_expected_status() -> u16 {
    200
}

fn default_checks() -> Vec<CheckType> {
    vec![CheckType::Http]
}

impl Target {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            check_interval: default_check_interval(),
            timeout: default_timeout(),
            expected_status: default_expected_status(),
            checks: default_checks(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Notifications {
    pub email: EmailSettings,
    pub webhook: WebhookSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
    pub to_addresses: Vec<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: "smtp.gmail.com".into(),
            smtp_port: 587,
            username: "alerts@example.com".into(),
            password: String::new(),
            from_address: "alerts@example.com".into(),
            to_addresses: vec!["admin@example.com".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookSettings {
    pub enabled: bool,
    pub url: String,
    pub method: String,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://hooks.slack.com/services/YOUR/WEBHOOK/URL".into(),
            method: "POST".into(),
        }
    }
}

/// Response times in seconds, uptimes as fractions of 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub response_time_warning: f64,
    pub response_time_critical: f64,
    pub uptime_warning: f64,
    pub uptime_critical: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            response_time_warning: 2.0,
            response_time_critical: 5.0,
            uptime_warning: 0.95,
            uptime_critical: 0.90,
        }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/sitewatch/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("sitewatch/config.toml"))
}

impl Default for Config {
    fn default() -> Self {
        let mut target = Target::new("main_website", "https://example.com");
        target.checks = vec![CheckType::Http, CheckType::Ssl, CheckType::Dns];

        Self {
            database_path: "website_monitor.db".into(),
            retention_days: 30,
            targets: vec![target],
            alert_rules: default_rules(),
            notifications: Notifications::default(),
            performance_thresholds: PerformanceThresholds::default(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Monitor Configuration:")?;
        write_1(f, "Database", &self.database_path.display())?;
        write_1(f, "Retention (days)", &self.retention_days)?;

        write_title_1(f, "Targets")?;
        for target in &self.targets {
            write_title_2(f, &target.name)?;
            write_2(f, "URL", &target.url)?;
            write_2(f, "Interval (s)", &target.check_interval)?;
            write_2(f, "Timeout (s)", &target.timeout)?;
            let checks: Vec<&str> = target.checks.iter().map(CheckType::as_str).collect();
            write_2(f, "Checks", &checks.join(", "))?;
        }

        write_title_1(f, "Alert Rules")?;
        for rule in &self.alert_rules {
            let state = if rule.enabled { "" } else { " (disabled)" };
            let summary = format!(
                "threshold={} consecutive={} cooldown={}m{}",
                rule.threshold, rule.consecutive_failures, rule.cooldown_minutes, state
            );
            write_2(f, &rule.name, &summary)?;
        }

        write_title_1(f, "Notifications")?;
        let email = &self.notifications.email;
        if email.enabled {
            let relay = format!("{}:{} ({}, password: ****)", email.smtp_server, email.smtp_port, email.username);
            write_2(f, "Email", &relay)?;
        } else {
            write_2(f, "Email", &"disabled")?;
        }
        let webhook = &self.notifications.webhook;
        if webhook.enabled {
            write_2(f, "Webhook", &format!("{} {}", webhook.method, webhook.url))?;
        } else {
            write_2(f, "Webhook", &"disabled")?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/sitewatch/config.toml
    ///  or the specified path if one does not exist
    ///
    /// ```no_run
    /// let cfg = sitewatch::config::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), sitewatch::config::Error>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            Self::from_toml(&raw_string)?
        } else {
            tracing::info!(path = %config_path.display(), "No config found, writing defaults");
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, Error> {
        Ok(toml::from_str(raw)?)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Sample configuration with two targets, written by `init-config`
    pub fn sample() -> Self {
        let mut main = Target::new("main_website", "https://example.com");
        main.checks = vec![CheckType::Http, CheckType::Ssl, CheckType::Dns];

        let mut api = Target::new("api_endpoint", "https://api.example.com/health");
        api.check_interval = 30;
        api.timeout = 5;

        Self { targets: vec![main, api], ..Self::default() }
    }

    /// Reject configurations the scheduler cannot run
    pub fn validate(&self) -> Result<(), Error> {
        if self.retention_days == 0 {
            return Err(Error::Invalid("retention_days must be at least 1".into()));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            let invalid = |e: anyhow::Error| Error::Invalid(format!("target '{}': {e}", target.name));

            if target.name.trim().is_empty() {
                return Err(Error::Invalid("target name cannot be empty".into()));
            }
            if !names.insert(target.name.as_str()) {
                return Err(Error::Invalid(format!("duplicate target name '{}'", target.name)));
            }
            validation::validate_target_url(&target.url).map_err(invalid)?;
            validation::validate_check_interval(target.check_interval).map_err(invalid)?;
            validation::validate_timeout(target.timeout).map_err(invalid)?;
            if target.checks.is_empty() {
                return Err(invalid(anyhow::anyhow!("at least one check is required")));
            }
        }

        let mut rule_names = HashSet::new();
        for rule in &self.alert_rules {
            if !rule_names.insert(rule.name.as_str()) {
                return Err(Error::Invalid(format!("duplicate alert rule '{}'", rule.name)));
            }
            if rule.consecutive_failures == 0 {
                return Err(Error::Invalid(format!(
                    "alert rule '{}': consecutive_failures must be at least 1",
                    rule.name
                )));
            }
        }

        Ok(())
    }
}
