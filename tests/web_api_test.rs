#![cfg(feature = "web")]
//! Web API integration tests.
//!
//! Tests cover:
//! - Ranked pages with pagination metadata
//! - Request validation (unknown indicator, segment, interval)
//! - Reconciled bars, instrument metadata and indicator details
//! - Error envelopes for missing data and store failures

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use extremescope::adapters::web::{build_router, AppState};
use extremescope::domain::catalog::CATALOG;
use extremescope::domain::record::IndicatorRecord;
use extremescope::domain::segment::MarketSegment;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use common::*;

fn app(store: MockStore) -> Router {
    build_router(AppState {
        store: Arc::new(store),
        provider: None,
    })
}

fn seeded_store() -> MockStore {
    let values: Vec<f64> = (0..15).map(|i| 50.0 + i as f64).collect();
    let mut record = IndicatorRecord::new("INFY", MarketSegment::Nse);
    record.numeric.insert("rsi_14_value", 72.5);

    MockStore::new()
        .with_ranked_values("rsi_14_value", MarketSegment::Nse, &values)
        .with_bars("INFY", MarketSegment::Nse, generate_bars("2024-01-01", 50, 1500.0))
        .with_instrument("INFY", "Infosys Limited", "NSE")
        .with_record(record)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).expect("JSON body");
    (status, json)
}

#[tokio::test]
async fn indicator_page_reports_has_more() {
    let (status, body) = get(app(seeded_store()), "/indicator-page?indicator=rsi&segment=NSE").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["meta"]["count"], 10);
    assert_eq!(body["meta"]["hasMore"], true);
    assert_eq!(body["data"][0]["rank"], 1);
    assert_eq!(body["data"][0]["value"], 64.0);
}

#[tokio::test]
async fn last_page_has_no_more() {
    let (status, body) = get(
        app(seeded_store()),
        "/indicator-page?indicator=rsi&segment=NSE&view=top&offset=10&limit=10",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 5);
    assert_eq!(body["meta"]["hasMore"], false);
    assert_eq!(body["data"][0]["rank"], 11);
}

#[tokio::test]
async fn unknown_indicator_is_bad_request() {
    let (status, body) = get(app(seeded_store()), "/indicator-page?indicator=momentum_x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("momentum_x"));
}

#[tokio::test]
async fn missing_indicator_is_bad_request() {
    let (status, _) = get(app(seeded_store()), "/indicator-page?segment=NSE").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_segment_is_bad_request() {
    let (status, body) = get(app(seeded_store()), "/indicator-page?indicator=rsi&segment=LSE").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn intraday_interval_is_rejected() {
    let (status, body) = get(app(seeded_store()), "/chart/bars?instrument=INFY&interval=1h").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "only daily interval is supported");
}

#[tokio::test]
async fn chart_bars_serve_local_history() {
    let (status, body) = get(
        app(seeded_store()),
        "/chart/bars?instrument=INFY&segment=NSE&limit=20",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 20);
    assert_eq!(body["meta"]["source"], "database");
    let bars = body["data"].as_array().unwrap();
    assert_eq!(bars.len(), 20);
    assert_eq!(bars.last().unwrap()["close"], 1549.0);
}

#[tokio::test]
async fn unknown_instrument_is_not_found() {
    let (status, body) = get(app(seeded_store()), "/instrument?id=NOPE&segment=NSE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn instrument_metadata_is_camel_case() {
    let (status, body) = get(app(seeded_store()), "/instrument?id=INFY&segment=NSE").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["displayName"], "Infosys Limited");
    assert_eq!(body["data"]["sector"], "Technology");
}

#[tokio::test]
async fn indicators_lists_catalog() {
    let (status, body) = get(app(MockStore::new()), "/indicators").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), CATALOG.len());
}

#[tokio::test]
async fn extreme_data_is_keyed_by_indicator() {
    let (status, body) = get(
        app(seeded_store()),
        "/extreme-data?segment=NSE&category=momentum&limit=3",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["category"], "momentum");
    let data = body["data"].as_object().unwrap();
    let mut keys: Vec<&str> = data.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["macd", "rsi", "vwap_deviation"]);
    assert_eq!(data["rsi"].as_array().unwrap().len(), 3);
    assert!(data["macd"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn extreme_data_rejects_unknown_category() {
    let (status, _) = get(app(seeded_store()), "/extreme-data?category=sentiment").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn indicator_details_for_recorded_instrument() {
    let (status, body) = get(app(seeded_store()), "/indicator-details?instrument=INFY").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"][0]["column"], "rsi_14_value");
    assert_eq!(body["data"][0]["value"], 72.5);
}

#[tokio::test]
async fn indicator_details_for_unknown_instrument_is_not_found() {
    let (status, _) = get(app(seeded_store()), "/indicator-details?instrument=NOPE").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn store_failure_is_server_error() {
    let (status, body) = get(
        app(MockStore::failing("connection reset")),
        "/indicator-page?indicator=rsi",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = get(app(MockStore::new()), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn unknown_route_is_json_not_found() {
    let (status, body) = get(app(MockStore::new()), "/no/such/route").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
