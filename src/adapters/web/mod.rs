//! JSON web API adapter.
//!
//! Serves ranked indicator pages, reconciled bars and instrument metadata to
//! listing views and chart panels.

mod error;
mod handlers;

pub use error::{status_from_error, WebError};
pub use handlers::*;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::ports::data_port::StorePort;
use crate::ports::provider_port::ProviderPort;

pub struct AppState {
    pub store: Arc<dyn StorePort>,
    /// `None` when no provider key is configured.
    pub provider: Option<Arc<dyn ProviderPort>>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/indicator-page", get(handlers::indicator_page))
        .route("/chart/bars", get(handlers::chart_bars))
        .route("/instrument", get(handlers::instrument))
        .route("/indicators", get(handlers::indicators))
        .route("/extreme-data", get(handlers::extreme_data))
        .route("/indicator-details", get(handlers::indicator_details))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}
