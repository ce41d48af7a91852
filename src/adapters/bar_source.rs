//! [`BarSource`] implementations for the chart controller.
//!
//! `ReconcilingBarSource` calls the reconciliation service in-process;
//! `HttpBarSource` goes through a running `serve` instance.

use crate::domain::bar::Bar;
use crate::domain::context::PanelRequest;
use crate::domain::error::ChartError;
use crate::domain::reconcile;
use crate::domain::record::InstrumentInfo;
use crate::domain::segment::MarketSegment;
use crate::ports::chart_port::BarSource;
use crate::ports::data_port::StorePort;
use crate::ports::provider_port::ProviderPort;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub struct ReconcilingBarSource {
    store: Arc<dyn StorePort>,
    provider: Option<Arc<dyn ProviderPort>>,
}

impl ReconcilingBarSource {
    pub fn new(store: Arc<dyn StorePort>, provider: Option<Arc<dyn ProviderPort>>) -> Self {
        Self { store, provider }
    }
}

#[async_trait(?Send)]
impl BarSource for ReconcilingBarSource {
    async fn fetch_bars(&self, request: &PanelRequest) -> Result<Vec<Bar>, ChartError> {
        let series = reconcile::get_bars(
            self.store.as_ref(),
            self.provider.as_deref(),
            &request.instrument,
            request.segment,
            request.bar_count(),
            chrono::Utc::now().date_naive(),
        )
        .await
        .map_err(|e| ChartError::Fetch(e.to_string()))?;
        Ok(series.bars)
    }

    async fn instrument_name(
        &self,
        instrument: &str,
        segment: MarketSegment,
    ) -> Result<Option<String>, ChartError> {
        self.store
            .fetch_instrument(instrument, segment)
            .map(|info| info.map(|i| i.display_name))
            .map_err(|e| ChartError::Fetch(e.to_string()))
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ChartError> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(ChartError::Fetch(
                self.error.unwrap_or_else(|| "server reported failure".to_string()),
            )),
        }
    }
}

pub struct HttpBarSource {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBarSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

fn fetch_error(e: reqwest::Error) -> ChartError {
    ChartError::Fetch(e.to_string())
}

#[async_trait(?Send)]
impl BarSource for HttpBarSource {
    async fn fetch_bars(&self, request: &PanelRequest) -> Result<Vec<Bar>, ChartError> {
        let limit = request.bar_count().to_string();
        let resp = self
            .http
            .get(format!("{}/chart/bars", self.base_url))
            .query(&[
                ("instrument", request.instrument.as_str()),
                ("segment", request.segment.as_str()),
                ("limit", limit.as_str()),
                ("interval", "1d"),
            ])
            .send()
            .await
            .map_err(fetch_error)?;
        let envelope: Envelope<Vec<Bar>> = resp.json().await.map_err(fetch_error)?;
        envelope.into_data()
    }

    async fn instrument_name(
        &self,
        instrument: &str,
        segment: MarketSegment,
    ) -> Result<Option<String>, ChartError> {
        let resp = self
            .http
            .get(format!("{}/instrument", self.base_url))
            .query(&[("id", instrument), ("segment", segment.as_str())])
            .send()
            .await
            .map_err(fetch_error)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let envelope: Envelope<InstrumentInfo> = resp.json().await.map_err(fetch_error)?;
        envelope.into_data().map(|info| Some(info.display_name))
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::adapters::sqlite_adapter::SqliteStore;
    use crate::domain::context::Timeframe;
    use axum::routing::get;
    use axum::{Json, Router};
    use chrono::NaiveDate;
    use serde_json::json;

    fn bar(d: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
            volume: Some(1000.0),
        }
    }

    #[tokio::test]
    async fn reconciling_source_reads_store_and_name() {
        let store = SqliteStore::in_memory().unwrap();
        store.initialize_schema().unwrap();
        store
            .insert_bars("TCS", MarketSegment::Nse, &[bar(1, 10.0), bar(2, 11.0)])
            .unwrap();
        store
            .insert_instrument(&InstrumentInfo {
                instrument: "TCS".into(),
                display_name: "Tata Consultancy".into(),
                sector: None,
                industry: None,
                market_cap: None,
                exchange: "NSE".into(),
            })
            .unwrap();

        let source = ReconcilingBarSource::new(Arc::new(store), None);
        let request = PanelRequest::new("TCS", MarketSegment::Nse, Timeframe::OneMonth);
        let bars = source.fetch_bars(&request).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(
            source.instrument_name("TCS", MarketSegment::Nse).await.unwrap(),
            Some("Tata Consultancy".to_string())
        );
        assert_eq!(source.instrument_name("INFY", MarketSegment::Nse).await.unwrap(), None);
    }

    #[tokio::test]
    async fn http_source_unwraps_envelopes() {
        let router = Router::new()
            .route(
                "/chart/bars",
                get(|| async {
                    Json(json!({
                        "success": true,
                        "data": [{"time": "2024-03-01", "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5}],
                        "meta": {"count": 1, "source": "database"}
                    }))
                }),
            )
            .route(
                "/instrument",
                get(|| async {
                    (
                        axum::http::StatusCode::NOT_FOUND,
                        Json(json!({"success": false, "error": "instrument not found"})),
                    )
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let source = HttpBarSource::new(format!("http://{addr}/"));
        let request = PanelRequest::new("X", MarketSegment::Us, Timeframe::OneMonth);
        let bars = source.fetch_bars(&request).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, None);
        assert_eq!(source.instrument_name("X", MarketSegment::Us).await.unwrap(), None);
    }

    #[test]
    fn failed_envelope_becomes_fetch_error() {
        let envelope: Envelope<Vec<Bar>> =
            serde_json::from_value(json!({"success": false, "error": "database unavailable"})).unwrap();
        assert_eq!(
            envelope.into_data(),
            Err(ChartError::Fetch("database unavailable".to_string()))
        );
    }
}
