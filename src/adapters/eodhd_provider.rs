//! EODHD end-of-day bar provider.

use crate::domain::bar::Bar;
use crate::domain::error::{ProviderError, ScopeError};
use crate::domain::segment::MarketSegment;
use crate::ports::config_port::ConfigPort;
use crate::ports::provider_port::ProviderPort;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://eodhd.com";
pub const API_KEY_ENV: &str = "EXTREMESCOPE_PROVIDER_API_KEY";

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// `false` keeps the provider off even when a key is present.
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_requests_per_minute: u32,
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Reads the `[provider]` section. The API key falls back to the
    /// environment when the file leaves it blank.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let api_key = config
            .get_string("provider", "api_key")
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty());

        Self {
            enabled: config.get_bool("provider", "enabled", true),
            base_url: config
                .get_string("provider", "base_url")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            max_requests_per_minute: config
                .get_int("provider", "max_requests_per_minute", 60)
                .max(1) as u32,
            timeout: Duration::from_secs(config.get_int("provider", "timeout_secs", 10).max(1) as u64),
        }
    }
}

pub struct EodhdProvider {
    config: ProviderConfig,
    api_key: String,
    http: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl EodhdProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = config.api_key.clone().ok_or(ProviderError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("extremescope/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(config.max_requests_per_minute))),
            api_key,
            config,
            http,
        })
    }

    /// `None` when the provider is disabled or no API key is configured;
    /// other construction failures are surfaced as config errors.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, ScopeError> {
        let config = ProviderConfig::from_config(config);
        if !config.enabled {
            debug!("provider disabled in config");
            return Ok(None);
        }
        match Self::new(config) {
            Ok(provider) => Ok(Some(provider)),
            Err(ProviderError::MissingApiKey) => Ok(None),
            Err(e) => Err(ScopeError::ConfigInvalid {
                section: "provider".into(),
                key: "base_url".into(),
                reason: e.to_string(),
            }),
        }
    }

    fn endpoint(&self, instrument: &str, segment: MarketSegment) -> String {
        format!(
            "{}/api/eod/{}.{}",
            self.config.base_url.trim_end_matches('/'),
            instrument,
            segment.as_str()
        )
    }
}

#[async_trait]
impl ProviderPort for EodhdProvider {
    async fn fetch_daily_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        self.rate_limiter.lock().await.try_acquire()?;

        let from = from.format("%Y-%m-%d").to_string();
        let to = to.format("%Y-%m-%d").to_string();
        let resp = self
            .http
            .get(self.endpoint(instrument, segment))
            .query(&[
                ("api_token", self.api_key.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("fmt", "json"),
            ])
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }

        let json: Value = resp.json().await?;
        let bars = parse_eod_payload(&json)?;
        debug!(instrument, segment = %segment, bars = bars.len(), "provider bars fetched");
        Ok(bars)
    }
}

/// Parses the EOD array into ascending bars. Rows with an unparseable date
/// are rejected; a missing volume is kept as `None`.
pub fn parse_eod_payload(json: &Value) -> Result<Vec<Bar>, ProviderError> {
    let rows = json
        .as_array()
        .ok_or_else(|| ProviderError::Parse("expected a JSON array".to_string()))?;

    let mut bars = Vec::with_capacity(rows.len());
    for row in rows {
        let date_str = row
            .get("date")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Parse("row without date".to_string()))?;
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .map_err(|e| ProviderError::Parse(format!("invalid date {date_str}: {e}")))?;
        bars.push(Bar {
            date,
            open: number(row, "open", date_str)?,
            high: number(row, "high", date_str)?,
            low: number(row, "low", date_str)?,
            close: number(row, "close", date_str)?,
            volume: row.get("volume").and_then(Value::as_f64),
        });
    }
    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn number(row: &Value, key: &str, date: &str) -> Result<f64, ProviderError> {
    row.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ProviderError::Parse(format!("missing {key} for {date}")))
}

struct RateLimiter {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl RateLimiter {
    fn new(max_per_minute: u32) -> Self {
        let capacity = max_per_minute as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / 60.0,
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> Result<(), ProviderError> {
        self.refill();
        if self.tokens < 1.0 {
            return Err(ProviderError::RateLimited);
        }
        self.tokens -= 1.0;
        Ok(())
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = Instant::now();
    }
}
