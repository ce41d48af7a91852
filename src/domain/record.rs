//! Indicator records and instrument metadata as read from the store.

use crate::domain::catalog::IndicatorDef;
use crate::domain::error::ScopeError;
use crate::domain::segment::MarketSegment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of a segment's indicator table.
///
/// Only columns present in the segment schema can appear here; the adapters
/// build records by walking [`SegmentSchema`](crate::domain::segment::SegmentSchema)
/// columns, never by introspecting arbitrary row keys.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    pub instrument: String,
    pub display_name: Option<String>,
    pub segment: MarketSegment,
    /// Non-null numeric columns (values and ranks).
    pub numeric: BTreeMap<&'static str, f64>,
    /// Non-null tag columns.
    pub tags: BTreeMap<&'static str, String>,
}

/// The reading of one indicator for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReading {
    pub value: Option<f64>,
    pub rank: Option<u32>,
    pub extreme: Option<String>,
}

impl IndicatorRecord {
    pub fn new(instrument: impl Into<String>, segment: MarketSegment) -> Self {
        Self {
            instrument: instrument.into(),
            display_name: None,
            segment,
            numeric: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    /// Read an indicator through the segment schema.
    ///
    /// A value column the schema lacks is a `SchemaGap`; rank and extreme
    /// columns the schema lacks simply read as `None`.
    pub fn field(&self, def: &IndicatorDef) -> Result<FieldReading, ScopeError> {
        let schema = self.segment.schema();
        schema.require(self.segment, def.value_column)?;

        let rank = def
            .rank_column
            .filter(|c| schema.has_column(c))
            .and_then(|c| self.numeric.get(c))
            .and_then(|r| rank_from_f64(*r));
        let extreme = def
            .extreme_column
            .filter(|c| schema.has_column(c))
            .and_then(|c| self.tags.get(c).cloned());

        Ok(FieldReading {
            value: self.numeric.get(def.value_column).copied(),
            rank,
            extreme,
        })
    }

    pub fn value(&self, column: &str) -> Option<f64> {
        self.numeric.get(column).copied()
    }

    pub fn tag(&self, column: &str) -> Option<&str> {
        self.tags.get(column).map(String::as_str)
    }
}

/// Stored ranks are 1-based; anything else is treated as absent.
pub fn rank_from_f64(raw: f64) -> Option<u32> {
    if raw.is_finite() && raw >= 1.0 && raw <= u32::MAX as f64 {
        Some(raw as u32)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentInfo {
    pub instrument: String,
    pub display_name: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub exchange: String,
}
