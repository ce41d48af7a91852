//! Indicator catalog.
//!
//! Static registry of the indicators the listing views know how to rank:
//! which column holds the value, which optional columns hold the
//! precomputed rank and extreme tag, and which direction counts as extreme.

use crate::domain::error::ScopeError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Which end of an indicator's range counts as "most extreme".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Momentum,
    Trend,
    Volume,
    Volatility,
    Additional,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Momentum => "momentum",
            Category::Trend => "trend",
            Category::Volume => "volume",
            Category::Volatility => "volatility",
            Category::Additional => "additional",
        }
    }

    /// Parse a category filter. `all` (or an empty string) means no filter.
    pub fn parse_filter(input: &str) -> Result<Option<Category>, ScopeError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(None);
        }
        trimmed.parse().map(Some)
    }
}

impl FromStr for Category {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "momentum" => Ok(Category::Momentum),
            "trend" => Ok(Category::Trend),
            "volume" => Ok(Category::Volume),
            "volatility" => Ok(Category::Volatility),
            "additional" => Ok(Category::Additional),
            other => Err(ScopeError::InvalidRequest(format!(
                "unknown category: {other}"
            ))),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorDef {
    pub key: &'static str,
    pub title: &'static str,
    pub category: Category,
    pub value_column: &'static str,
    pub extreme_column: Option<&'static str>,
    pub rank_column: Option<&'static str>,
    pub direction: Direction,
}

const fn core(
    key: &'static str,
    title: &'static str,
    category: Category,
    value_column: &'static str,
    extreme_column: &'static str,
    rank_column: &'static str,
) -> IndicatorDef {
    IndicatorDef {
        key,
        title,
        category,
        value_column,
        extreme_column: Some(extreme_column),
        rank_column: Some(rank_column),
        direction: Direction::High,
    }
}

const fn value_only(
    column: &'static str,
    title: &'static str,
    category: Category,
) -> IndicatorDef {
    IndicatorDef {
        key: column,
        title,
        category,
        value_column: column,
        extreme_column: None,
        rank_column: None,
        direction: Direction::High,
    }
}

pub const CATALOG: &[IndicatorDef] = &[
    core("rsi", "RSI (14)", Category::Momentum, "rsi_14_value", "rsi_14_extreme", "rsi_14_rank"),
    core("macd", "MACD Z-Score", Category::Momentum, "macd_z_score", "macd_extreme", "macd_rank"),
    core(
        "bollinger",
        "Bollinger Z-Score",
        Category::Volatility,
        "bollinger_z_score",
        "bollinger_z_extreme",
        "bollinger_rank",
    ),
    core(
        "bollinger_breakout",
        "Bollinger Breakout",
        Category::Volatility,
        "bollinger_breakout_value",
        "bollinger_breakout_extreme",
        "bollinger_breakout_rank",
    ),
    core("adx", "ADX (14)", Category::Trend, "adx_14_value", "adx_14_extreme", "adx_14_rank"),
    core("cmf", "CMF (20)", Category::Volume, "cmf_20_value", "cmf_20_extreme", "cmf_20_rank"),
    value_only("ema_fast", "EMA Fast (12)", Category::Trend),
    value_only("ema_slow", "EMA Slow (26)", Category::Trend),
    value_only("sma_normalized", "SMA Normalized", Category::Trend),
    value_only("slope_normalized", "Price Slope", Category::Trend),
    value_only("avgvol_normalized", "Average Volume", Category::Volume),
    value_only("avgvolccy_normalized", "Avg Volume (Value)", Category::Volume),
    value_only("obv", "On-Balance Volume", Category::Volume),
    value_only("obv_z", "OBV Z-Score", Category::Volume),
    value_only("atr_14", "ATR (14)", Category::Volatility),
    value_only("atr_normalized", "ATR Normalized", Category::Volatility),
    value_only("beta", "Beta", Category::Volatility),
    value_only("stddev_normalized", "Std Dev Normalized", Category::Volatility),
    value_only("vwap_deviation", "VWAP Deviation", Category::Momentum),
    value_only("volume_ratio", "Volume Ratio", Category::Volume),
];

pub fn find(key: &str) -> Option<&'static IndicatorDef> {
    CATALOG.iter().find(|def| def.key == key)
}

pub fn lookup(key: &str) -> Result<&'static IndicatorDef, ScopeError> {
    find(key).ok_or_else(|| ScopeError::UnknownIndicator(key.to_string()))
}

pub fn by_value_column(column: &str) -> Option<&'static IndicatorDef> {
    CATALOG.iter().find(|def| def.value_column == column)
}

pub fn in_category(category: Option<Category>) -> impl Iterator<Item = &'static IndicatorDef> {
    CATALOG
        .iter()
        .filter(move |def| category.is_none_or(|c| def.category == c))
}

/// Rank column naming convention for value columns outside the catalog.
pub fn derive_rank_column(value_column: &str) -> String {
    const SUFFIXES: &[&str] = &[
        "_value",
        "_z_score",
        "_normalized",
        "_pctb",
        "_20",
        "_fast",
        "_slow",
    ];
    for suffix in SUFFIXES {
        if let Some(stem) = value_column.strip_suffix(suffix) {
            return format!("{stem}_rank");
        }
    }
    format!("{value_column}_rank")
}

/// `rsi_14_value` -> `Rsi 14 Value`
pub fn humanize_column(column: &str) -> String {
    column
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
