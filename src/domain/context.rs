//! Listing and panel context objects.
//!
//! Built per request (web) or per session (CLI, chart controller) and passed
//! explicitly to whatever needs the current selection.

use crate::domain::catalog::Category;
use crate::domain::error::ScopeError;
use crate::domain::segment::MarketSegment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chart time range, expressed as the number of daily bars requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "6M")]
    SixMonths,
    #[default]
    #[serde(rename = "200D")]
    TwoHundredDays,
    #[serde(rename = "1Y")]
    OneYear,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneMonth,
        Timeframe::ThreeMonths,
        Timeframe::SixMonths,
        Timeframe::TwoHundredDays,
        Timeframe::OneYear,
    ];

    pub fn bar_count(&self) -> usize {
        match self {
            Timeframe::OneMonth => 30,
            Timeframe::ThreeMonths => 90,
            Timeframe::SixMonths => 180,
            Timeframe::TwoHundredDays => 200,
            Timeframe::OneYear => 365,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::OneMonth => "1M",
            Timeframe::ThreeMonths => "3M",
            Timeframe::SixMonths => "6M",
            Timeframe::TwoHundredDays => "200D",
            Timeframe::OneYear => "1Y",
        }
    }
}

impl FromStr for Timeframe {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Timeframe::ALL
            .into_iter()
            .find(|tf| tf.label() == wanted)
            .ok_or_else(|| ScopeError::InvalidRequest(format!("unknown timeframe: {s}")))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Descriptor of the open detail panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRequest {
    pub instrument: String,
    pub segment: MarketSegment,
    pub timeframe: Timeframe,
}

impl PanelRequest {
    pub fn new(instrument: impl Into<String>, segment: MarketSegment, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.into(),
            segment,
            timeframe,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.timeframe.bar_count()
    }
}

/// Selection state of a listing view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingContext {
    pub segment: MarketSegment,
    pub category: Option<Category>,
    pub open_panel: Option<PanelRequest>,
}

impl ListingContext {
    pub fn new(segment: MarketSegment, category: Option<Category>) -> Self {
        Self {
            segment,
            category,
            open_panel: None,
        }
    }

    /// Select a row: the panel opens on the listing's segment.
    pub fn open_panel(&mut self, instrument: impl Into<String>, timeframe: Timeframe) -> &PanelRequest {
        self.open_panel
            .insert(PanelRequest::new(instrument, self.segment, timeframe))
    }

    pub fn close_panel(&mut self) -> Option<PanelRequest> {
        self.open_panel.take()
    }
}

impl Default for ListingContext {
    fn default() -> Self {
        Self::new(MarketSegment::Nse, None)
    }
}
