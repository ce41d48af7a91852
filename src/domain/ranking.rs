//! Rank-based extreme retrieval.
//!
//! Turns a segment's indicator table into paginated top/bottom pages. The
//! engine plans a [`RankSelection`] from the catalog and the segment schema,
//! lets the store execute it, then assigns effective ranks.

use crate::domain::catalog::{self, Direction, IndicatorDef};
use crate::domain::error::ScopeError;
use crate::domain::segment::MarketSegment;
use crate::ports::data_port::IndicatorPort;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Top,
    Bottom,
}

impl FromStr for View {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(View::Top),
            "bottom" => Ok(View::Bottom),
            other => Err(ScopeError::InvalidRequest(format!("unknown view: {other}"))),
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            View::Top => f.write_str("top"),
            View::Bottom => f.write_str("bottom"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankQuery<'a> {
    pub indicator: &'a str,
    pub segment: MarketSegment,
    pub view: View,
    pub offset: u32,
    pub limit: u32,
}

impl<'a> RankQuery<'a> {
    /// Build a query from raw caller input: `limit` is clamped into
    /// `1..=MAX_LIMIT` and negative offsets become 0.
    pub fn new(
        indicator: &'a str,
        segment: MarketSegment,
        view: View,
        offset: i64,
        limit: i64,
    ) -> Self {
        let limit = limit.clamp(1, MAX_LIMIT as i64) as u32;
        let offset = offset.clamp(0, (u32::MAX - MAX_LIMIT) as i64) as u32;
        Self {
            indicator,
            segment,
            view,
            offset,
            limit,
        }
    }
}

/// How the store should order and window the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    /// Rows whose stored rank lies in `first..=last`, rank ascending.
    RankWindow {
        rank_column: &'static str,
        first: u32,
        last: u32,
    },
    /// Rows ordered by stored rank descending (nulls last), then windowed.
    RankDescending {
        rank_column: &'static str,
        offset: u32,
        limit: u32,
    },
    /// Rows ordered by raw value, then windowed.
    ByValue {
        ascending: bool,
        offset: u32,
        limit: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankSelection {
    pub value_column: &'static str,
    pub rank_column: Option<&'static str>,
    pub extreme_column: Option<&'static str>,
    pub order: RankOrder,
}

/// One row as returned by the store for a [`RankSelection`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRow {
    pub instrument: String,
    pub display_name: Option<String>,
    pub value: f64,
    pub stored_rank: Option<u32>,
    pub extreme: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedEntry {
    pub instrument: String,
    pub display_name: Option<String>,
    pub value: f64,
    pub extreme: Option<String>,
    pub segment: MarketSegment,
    /// Stored rank on the top view; page position (`offset + i + 1`) on the
    /// bottom view and wherever no rank column exists.
    pub rank: u32,
    pub stored_rank: Option<u32>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankedPage {
    pub entries: Vec<RankedEntry>,
    pub has_more: bool,
}

impl RankedPage {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Value sort order for indicators without a usable rank column. `top`
/// always yields the most extreme end in the indicator's direction.
pub fn value_ascending(direction: Direction, view: View) -> bool {
    match direction {
        Direction::High => view == View::Bottom,
        Direction::Low => view == View::Top,
    }
}

pub fn plan_selection(
    def: &'static IndicatorDef,
    segment: MarketSegment,
    view: View,
    offset: u32,
    limit: u32,
) -> Result<RankSelection, ScopeError> {
    let schema = segment.schema();
    schema.require(segment, def.value_column)?;

    let rank_column = def.rank_column.filter(|c| schema.has_column(c));
    let extreme_column = def.extreme_column.filter(|c| schema.has_column(c));

    let order = match (rank_column, view) {
        (Some(rank_column), View::Top) => RankOrder::RankWindow {
            rank_column,
            first: offset.saturating_add(1),
            last: offset.saturating_add(limit),
        },
        (Some(rank_column), View::Bottom) => RankOrder::RankDescending {
            rank_column,
            offset,
            limit,
        },
        (None, view) => RankOrder::ByValue {
            ascending: value_ascending(def.direction, view),
            offset,
            limit,
        },
    };

    Ok(RankSelection {
        value_column: def.value_column,
        rank_column,
        extreme_column,
        order,
    })
}

/// Fetch one ranked page.
///
/// A column missing from the segment (by schema or as reported by the
/// store) yields an empty page. Every other store failure propagates.
pub fn get_ranked_page<S: IndicatorPort + ?Sized>(
    store: &S,
    query: &RankQuery<'_>,
    captured_at: DateTime<Utc>,
) -> Result<RankedPage, ScopeError> {
    let def = catalog::lookup(query.indicator)?;

    let selection = match plan_selection(def, query.segment, query.view, query.offset, query.limit)
    {
        Ok(selection) => selection,
        Err(ScopeError::SchemaGap { segment, column }) => {
            debug!(%segment, %column, indicator = def.key, "indicator not in segment schema");
            return Ok(RankedPage::empty());
        }
        Err(e) => return Err(e),
    };

    let rows = match store.select_ranked(query.segment, &selection) {
        Ok(rows) => rows,
        Err(ScopeError::SchemaGap { segment, column }) => {
            warn!(%segment, %column, indicator = def.key, "store reported missing column");
            return Ok(RankedPage::empty());
        }
        Err(e) => return Err(e),
    };

    let use_stored_rank = selection.rank_column.is_some() && query.view == View::Top;
    let entries: Vec<RankedEntry> = rows
        .into_iter()
        .take(query.limit as usize)
        .enumerate()
        .map(|(index, row)| {
            let positional = query.offset + index as u32 + 1;
            let rank = if use_stored_rank {
                row.stored_rank.unwrap_or(positional)
            } else {
                positional
            };
            RankedEntry {
                instrument: row.instrument,
                display_name: row.display_name,
                value: row.value,
                extreme: row.extreme,
                segment: query.segment,
                rank,
                stored_rank: row.stored_rank,
                captured_at,
            }
        })
        .collect();

    let has_more = entries.len() == query.limit as usize;
    Ok(RankedPage { entries, has_more })
}
