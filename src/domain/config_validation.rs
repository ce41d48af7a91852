//! Configuration validation.
//!
//! Checks every section the service reads before any adapter is built, and
//! turns the `[chart]` section into typed settings.

use crate::domain::chart::ChartSettings;
use crate::domain::context::Timeframe;
use crate::domain::error::ScopeError;
use crate::ports::config_port::ConfigPort;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

pub fn validate_service_config(config: &dyn ConfigPort) -> Result<(), ScopeError> {
    validate_pool_size(config, "sqlite")?;
    validate_pool_size(config, "postgres")?;
    validate_provider(config)?;
    validate_listen(config)?;
    chart_settings(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ScopeError {
    ScopeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn validate_pool_size(config: &dyn ConfigPort, section: &str) -> Result<(), ScopeError> {
    let value = config.get_int(section, "pool_size", 4);
    if value < 1 {
        return Err(invalid(section, "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

fn validate_provider(config: &dyn ConfigPort) -> Result<(), ScopeError> {
    let rate = config.get_int("provider", "max_requests_per_minute", 60);
    if rate < 1 {
        return Err(invalid(
            "provider",
            "max_requests_per_minute",
            "max_requests_per_minute must be at least 1",
        ));
    }
    let timeout = config.get_int("provider", "timeout_secs", 10);
    if timeout < 1 {
        return Err(invalid(
            "provider",
            "timeout_secs",
            "timeout_secs must be at least 1",
        ));
    }
    if let Some(url) = config.get_string("provider", "base_url") {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid(
                "provider",
                "base_url",
                "base_url must start with http:// or https://",
            ));
        }
    }
    Ok(())
}

fn validate_listen(config: &dyn ConfigPort) -> Result<(), ScopeError> {
    listen_addr(config).map(|_| ())
}

pub fn listen_addr(config: &dyn ConfigPort) -> Result<SocketAddr, ScopeError> {
    let raw = config
        .get_string("web", "listen")
        .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
    raw.trim()
        .parse()
        .map_err(|_| invalid("web", "listen", format!("invalid socket address: {raw}")))
}

/// Typed `[chart]` section: controller settings and the default timeframe.
pub fn chart_settings(config: &dyn ConfigPort) -> Result<(ChartSettings, Timeframe), ScopeError> {
    let defaults = ChartSettings::default();

    let retry_limit = config.get_int(
        "chart",
        "apply_retry_limit",
        defaults.apply_retry_limit as i64,
    );
    if retry_limit < 1 || retry_limit > u32::MAX as i64 {
        return Err(invalid(
            "chart",
            "apply_retry_limit",
            "apply_retry_limit must be at least 1",
        ));
    }

    let backoff_ms = config.get_int(
        "chart",
        "apply_retry_backoff_ms",
        defaults.apply_retry_backoff.as_millis() as i64,
    );
    if backoff_ms < 0 {
        return Err(invalid(
            "chart",
            "apply_retry_backoff_ms",
            "apply_retry_backoff_ms must be non-negative",
        ));
    }

    let timeframe = match config.get_string("chart", "default_timeframe") {
        Some(raw) => raw
            .parse::<Timeframe>()
            .map_err(|_| invalid("chart", "default_timeframe", format!("unknown timeframe: {raw}")))?,
        None => Timeframe::default(),
    };

    Ok((
        ChartSettings {
            apply_retry_limit: retry_limit as u32,
            apply_retry_backoff: Duration::from_millis(backoff_ms as u64),
        },
        timeframe,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = make_config("");
        assert!(validate_service_config(&config).is_ok());
        let (settings, timeframe) = chart_settings(&config).unwrap();
        assert_eq!(settings, ChartSettings::default());
        assert_eq!(timeframe, Timeframe::TwoHundredDays);
        assert_eq!(listen_addr(&config).unwrap().port(), 3000);
    }

    #[test]
    fn full_config_passes() {
        let config = make_config(
            r#"
[sqlite]
path = /var/lib/extremescope/data.db
pool_size = 8

[provider]
base_url = https://eodhd.example
api_key = secret
max_requests_per_minute = 30
timeout_secs = 5

[web]
listen = 0.0.0.0:8080

[chart]
apply_retry_limit = 3
apply_retry_backoff_ms = 50
default_timeframe = 6M
"#,
        );
        assert!(validate_service_config(&config).is_ok());
        let (settings, timeframe) = chart_settings(&config).unwrap();
        assert_eq!(settings.apply_retry_limit, 3);
        assert_eq!(settings.apply_retry_backoff, Duration::from_millis(50));
        assert_eq!(timeframe, Timeframe::SixMonths);
    }

    #[test]
    fn pool_size_must_be_positive() {
        let config = make_config("[sqlite]\npool_size = 0\n");
        let err = validate_service_config(&config).unwrap_err();
        assert!(matches!(err, ScopeError::ConfigInvalid { key, .. } if key == "pool_size"));
    }

    #[test]
    fn rate_limit_must_be_positive() {
        let config = make_config("[provider]\nmax_requests_per_minute = 0\n");
        let err = validate_service_config(&config).unwrap_err();
        assert!(
            matches!(err, ScopeError::ConfigInvalid { key, .. } if key == "max_requests_per_minute")
        );
    }

    #[test]
    fn base_url_needs_scheme() {
        let config = make_config("[provider]\nbase_url = eodhd.com\n");
        let err = validate_service_config(&config).unwrap_err();
        assert!(matches!(err, ScopeError::ConfigInvalid { key, .. } if key == "base_url"));
    }

    #[test]
    fn zero_retry_limit_fails() {
        let config = make_config("[chart]\napply_retry_limit = 0\n");
        let err = chart_settings(&config).unwrap_err();
        assert!(
            matches!(err, ScopeError::ConfigInvalid { key, .. } if key == "apply_retry_limit")
        );
    }

    #[test]
    fn unknown_timeframe_fails() {
        let config = make_config("[chart]\ndefault_timeframe = 10Y\n");
        let err = chart_settings(&config).unwrap_err();
        assert!(
            matches!(err, ScopeError::ConfigInvalid { key, .. } if key == "default_timeframe")
        );
    }

    #[test]
    fn bad_listen_address_fails() {
        let config = make_config("[web]\nlisten = localhost\n");
        let err = validate_service_config(&config).unwrap_err();
        assert!(matches!(err, ScopeError::ConfigInvalid { key, .. } if key == "listen"));
    }
}
