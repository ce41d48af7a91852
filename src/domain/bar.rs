//! Daily price bar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One trading day for one instrument. The date key serializes as `time`,
/// the field name chart clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "time")]
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Bar {
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

/// True when the sequence is strictly ascending by date (so also free of duplicates).
pub fn is_strictly_ordered(bars: &[Bar]) -> bool {
    bars.windows(2).all(|w| w[0].date < w[1].date)
}
