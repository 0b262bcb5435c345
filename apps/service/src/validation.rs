//! Validation of configured targets.
//!
//! Applied once when the configuration is loaded; a target that fails here
//! never reaches the scheduler.

use anyhow::{Result, anyhow};
use url::Url;

const MIN_INTERVAL: u64 = 1;
const MAX_INTERVAL: u64 = 86400; // 24 hours
const MIN_TIMEOUT: u64 = 1;
const MAX_TIMEOUT: u64 = 300; // 5 minutes

/// Validate a target URL: http(s) scheme, a host, and a non-zero port
pub fn validate_target_url(target: &str) -> Result<Url> {
    if target.trim().is_empty() {
        return Err(anyhow!("URL cannot be empty"));
    }

    let url = Url::parse(target).map_err(|e| {
        if target.contains("://") {
            anyhow!("Invalid URL: {e}")
        } else {
            anyhow!("URL must include scheme (http:// or https://)")
        }
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("Invalid scheme '{other}'. Must be http or https")),
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(anyhow!("URL must have a valid host"));
    }

    if url.port() == Some(0) {
        return Err(anyhow!("Port 0 is not valid"));
    }

    Ok(url)
}

/// Validate check interval bounds
pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    if interval_seconds < MIN_INTERVAL {
        return Err(anyhow!(
            "Check interval too short: {} seconds (minimum: {})",
            interval_seconds,
            MIN_INTERVAL
        ));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(anyhow!(
            "Check interval too long: {} seconds (maximum: {})",
            interval_seconds,
            MAX_INTERVAL
        ));
    }

    Ok(())
}

/// Validate timeout is reasonable
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "Timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "Timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}
