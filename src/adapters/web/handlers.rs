//! HTTP request handlers for the web adapter.
//!
//! Query parameters arrive as raw strings and are parsed here so that every
//! malformed value produces the same JSON error body.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::domain::catalog::{Category, CATALOG};
use crate::domain::context::ListingContext;
use crate::domain::dashboard;
use crate::domain::error::ScopeError;
use crate::domain::ranking::{get_ranked_page, RankQuery, View, DEFAULT_LIMIT};
use crate::domain::reconcile::{self, DEFAULT_BAR_LIMIT, MAX_BAR_LIMIT};
use crate::domain::segment::MarketSegment;

use super::{AppState, WebError};

const DAILY_INTERVAL: &str = "1d";

fn required<'a>(name: &str, raw: &'a Option<String>) -> Result<&'a str, ScopeError> {
    raw.as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ScopeError::InvalidRequest(format!("{name} is required")))
}

fn segment_param(raw: &Option<String>) -> Result<MarketSegment, ScopeError> {
    raw.as_deref().unwrap_or("NSE").parse()
}

fn int_param(name: &str, raw: &Option<String>, default: i64) -> Result<i64, ScopeError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| ScopeError::InvalidRequest(format!("{name} must be an integer"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct IndicatorPageQuery {
    pub indicator: Option<String>,
    pub segment: Option<String>,
    pub view: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
}

pub async fn indicator_page(
    State(state): State<Arc<AppState>>,
    Query(q): Query<IndicatorPageQuery>,
) -> Result<Json<Value>, WebError> {
    let indicator = required("indicator", &q.indicator)?;
    let segment = segment_param(&q.segment)?;
    let view: View = q.view.as_deref().unwrap_or("top").parse()?;
    let offset = int_param("offset", &q.offset, 0)?;
    let limit = int_param("limit", &q.limit, DEFAULT_LIMIT as i64)?;

    let query = RankQuery::new(indicator, segment, view, offset, limit);
    let page = get_ranked_page(state.store.as_ref(), &query, chrono::Utc::now())?;
    info!(
        indicator,
        %segment,
        %view,
        offset = query.offset,
        count = page.entries.len(),
        "indicator page served"
    );

    Ok(Json(json!({
        "success": true,
        "data": page.entries,
        "meta": { "count": page.entries.len(), "hasMore": page.has_more },
    })))
}

#[derive(Debug, Deserialize)]
pub struct BarsQuery {
    pub instrument: Option<String>,
    pub segment: Option<String>,
    pub limit: Option<String>,
    pub interval: Option<String>,
}

pub async fn chart_bars(
    State(state): State<Arc<AppState>>,
    Query(q): Query<BarsQuery>,
) -> Result<Json<Value>, WebError> {
    let instrument = required("instrument", &q.instrument)?;
    let segment = segment_param(&q.segment)?;
    let interval = q.interval.as_deref().unwrap_or(DAILY_INTERVAL);
    if interval != DAILY_INTERVAL {
        return Err(WebError::bad_request("only daily interval is supported"));
    }
    let limit = int_param("limit", &q.limit, DEFAULT_BAR_LIMIT as i64)?
        .clamp(1, MAX_BAR_LIMIT as i64) as usize;

    let series = reconcile::get_bars(
        state.store.as_ref(),
        state.provider.as_deref(),
        instrument,
        segment,
        limit,
        chrono::Utc::now().date_naive(),
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "data": series.bars,
        "meta": { "count": series.bars.len(), "source": series.source },
    })))
}

#[derive(Debug, Deserialize)]
pub struct InstrumentQuery {
    pub id: Option<String>,
    pub segment: Option<String>,
}

pub async fn instrument(
    State(state): State<Arc<AppState>>,
    Query(q): Query<InstrumentQuery>,
) -> Result<Json<Value>, WebError> {
    let id = required("id", &q.id)?;
    let segment = segment_param(&q.segment)?;
    let info = state
        .store
        .fetch_instrument(id, segment)?
        .ok_or_else(|| ScopeError::NotFound(format!("instrument {id}")))?;

    Ok(Json(json!({ "success": true, "data": info })))
}

pub async fn indicators() -> Json<Value> {
    Json(json!({ "success": true, "data": CATALOG }))
}

#[derive(Debug, Deserialize)]
pub struct ExtremeDataQuery {
    pub segment: Option<String>,
    pub category: Option<String>,
    pub limit: Option<String>,
}

pub async fn extreme_data(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ExtremeDataQuery>,
) -> Result<Json<Value>, WebError> {
    let segment = segment_param(&q.segment)?;
    let category = Category::parse_filter(q.category.as_deref().unwrap_or("all"))?;
    let limit = int_param("limit", &q.limit, DEFAULT_LIMIT as i64)?;

    let ctx = ListingContext::new(segment, category);
    let board = dashboard::extreme_board(state.store.as_ref(), &ctx, limit, chrono::Utc::now());

    Ok(Json(json!({
        "success": true,
        "data": board,
        "meta": {
            "segment": segment,
            "category": category.map(|c| c.as_str()).unwrap_or("all"),
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct DetailsQuery {
    pub instrument: Option<String>,
    pub segment: Option<String>,
}

pub async fn indicator_details(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DetailsQuery>,
) -> Result<Json<Value>, WebError> {
    let instrument = required("instrument", &q.instrument)?;
    let segment = segment_param(&q.segment)?;
    let details = dashboard::indicator_details(state.store.as_ref(), segment, instrument)?;

    Ok(Json(json!({
        "success": true,
        "data": details,
        "meta": { "count": details.len() },
    })))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn not_found() -> WebError {
    WebError::not_found("route not found")
}
