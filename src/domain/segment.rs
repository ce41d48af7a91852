//! Market segments and their indicator table schemas.
//!
//! Segments do not share one schema: the US table carries no extreme tags
//! and only some rank columns. Every column the core reads is resolved
//! through [`SegmentSchema`] instead of probing rows for keys.

use crate::domain::error::ScopeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketSegment {
    #[serde(rename = "NSE")]
    Nse,
    #[serde(rename = "US")]
    Us,
}

impl MarketSegment {
    pub const ALL: [MarketSegment; 2] = [MarketSegment::Nse, MarketSegment::Us];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketSegment::Nse => "NSE",
            MarketSegment::Us => "US",
        }
    }

    pub fn schema(&self) -> &'static SegmentSchema {
        match self {
            MarketSegment::Nse => &NSE_SCHEMA,
            MarketSegment::Us => &US_SCHEMA,
        }
    }
}

impl FromStr for MarketSegment {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NSE" => Ok(MarketSegment::Nse),
            "US" => Ok(MarketSegment::Us),
            other => Err(ScopeError::UnknownSegment(other.to_string())),
        }
    }
}

impl fmt::Display for MarketSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct SegmentSchema {
    pub table: &'static str,
    /// Rows of a shared table are filtered by `exchange = <segment>`.
    pub has_exchange_column: bool,
    /// Numeric columns: indicator values and precomputed ranks.
    pub numeric_columns: &'static [&'static str],
    /// Text columns: extreme tags.
    pub tag_columns: &'static [&'static str],
}

impl SegmentSchema {
    pub fn has_column(&self, column: &str) -> bool {
        self.numeric_columns.contains(&column) || self.tag_columns.contains(&column)
    }

    pub fn require(&self, segment: MarketSegment, column: &str) -> Result<(), ScopeError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(ScopeError::SchemaGap {
                segment: segment.to_string(),
                column: column.to_string(),
            })
        }
    }

    /// Columns that hold indicator values, as opposed to ranks.
    pub fn value_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.numeric_columns
            .iter()
            .copied()
            .filter(|c| !c.ends_with("_rank"))
    }
}

const NSE_SCHEMA: SegmentSchema = SegmentSchema {
    table: "stock_indicators",
    has_exchange_column: true,
    numeric_columns: &[
        "rsi_14_value",
        "rsi_14_rank",
        "macd_value",
        "macd_z_score",
        "macd_rank",
        "bollinger_z_value",
        "bollinger_z_score",
        "bollinger_rank",
        "bollinger_breakout_value",
        "bollinger_breakout_rank",
        "adx_14_value",
        "adx_14_rank",
        "cmf_20_value",
        "cmf_20_rank",
        "ema_fast",
        "ema_slow",
        "sma_normalized",
        "slope_normalized",
        "avgvol_normalized",
        "avgvolccy_normalized",
        "obv",
        "obv_z",
        "atr_14",
        "atr_normalized",
        "beta",
        "stddev_normalized",
        "vwap_deviation",
        "volume_ratio",
    ],
    tag_columns: &[
        "rsi_14_extreme",
        "macd_extreme",
        "bollinger_z_extreme",
        "bollinger_breakout_extreme",
        "adx_14_extreme",
        "cmf_20_extreme",
    ],
};

const US_SCHEMA: SegmentSchema = SegmentSchema {
    table: "stock_indicators_us",
    has_exchange_column: false,
    numeric_columns: &[
        "rsi_14_value",
        "rsi_14_rank",
        "macd_value",
        "macd_z_score",
        "bollinger_z_value",
        "bollinger_z_score",
        "adx_14_value",
        "adx_14_rank",
        "cmf_20_value",
        "ema_fast",
        "ema_slow",
        "sma_normalized",
        "slope_normalized",
        "avgvol_normalized",
        "obv",
        "obv_z",
        "atr_14",
        "atr_normalized",
        "beta",
        "stddev_normalized",
        "volume_ratio",
    ],
    tag_columns: &[],
};
