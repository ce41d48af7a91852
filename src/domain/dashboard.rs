//! Dashboard reads built on the ranking engine and indicator records.

use crate::domain::catalog::{self, Category, Direction};
use crate::domain::context::ListingContext;
use crate::domain::error::ScopeError;
use crate::domain::ranking::{get_ranked_page, RankQuery, RankedEntry, View};
use crate::domain::record::rank_from_f64;
use crate::domain::segment::MarketSegment;
use crate::ports::data_port::IndicatorPort;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

/// Top page of every catalog indicator in the context's category, keyed by
/// indicator key. A store failure on one indicator leaves that list empty.
pub fn extreme_board<S: IndicatorPort + ?Sized>(
    store: &S,
    ctx: &ListingContext,
    limit: i64,
    captured_at: DateTime<Utc>,
) -> BTreeMap<&'static str, Vec<RankedEntry>> {
    catalog::in_category(ctx.category)
        .map(|def| {
            let query = RankQuery::new(def.key, ctx.segment, View::Top, 0, limit);
            let entries = match get_ranked_page(store, &query, captured_at) {
                Ok(page) => page.entries,
                Err(e) => {
                    warn!(indicator = def.key, segment = %ctx.segment, error = %e, "extreme board entry failed");
                    Vec::new()
                }
            };
            (def.key, entries)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorDetail {
    pub column: &'static str,
    pub title: String,
    pub category: Category,
    pub direction: Direction,
    pub value: f64,
    pub rank: Option<u32>,
    pub extreme: Option<String>,
}

/// Every indicator value recorded for one instrument, sorted by title.
pub fn indicator_details<S: IndicatorPort + ?Sized>(
    store: &S,
    segment: MarketSegment,
    instrument: &str,
) -> Result<Vec<IndicatorDetail>, ScopeError> {
    let record = store
        .fetch_record(segment, instrument)?
        .ok_or_else(|| ScopeError::NotFound(format!("indicators for {instrument}")))?;
    let schema = segment.schema();

    let mut details: Vec<IndicatorDetail> = schema
        .value_columns()
        .filter_map(|column| {
            let value = record.value(column)?;
            let def = catalog::by_value_column(column);
            let rank_column = match def.and_then(|d| d.rank_column) {
                Some(rank) => rank.to_string(),
                None => catalog::derive_rank_column(column),
            };
            let rank = if schema.has_column(&rank_column) {
                record.value(&rank_column).and_then(rank_from_f64)
            } else {
                None
            };
            let extreme = def
                .and_then(|d| d.extreme_column)
                .filter(|c| schema.has_column(c))
                .and_then(|c| record.tag(c))
                .map(str::to_string);

            Some(IndicatorDetail {
                column,
                title: def
                    .map(|d| d.title.to_string())
                    .unwrap_or_else(|| catalog::humanize_column(column)),
                category: def.map(|d| d.category).unwrap_or(Category::Additional),
                direction: def.map(|d| d.direction).unwrap_or(Direction::High),
                value,
                rank,
                extreme,
            })
        })
        .collect();

    details.sort_by(|a, b| a.title.cmp(&b.title));
    Ok(details)
}
