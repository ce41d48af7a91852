//! Conversion of bars into the two chart series, plus the header summary.

use crate::domain::bar::Bar;
use crate::ports::chart_port::{CandlePoint, VolumePoint};
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SeriesData {
    pub candles: Vec<CandlePoint>,
    pub volumes: Vec<VolumePoint>,
}

impl SeriesData {
    pub fn from_bars(bars: &[Bar]) -> Self {
        let candles = bars
            .iter()
            .map(|b| CandlePoint {
                time: b.date,
                open: b.open,
                high: b.high,
                low: b.low,
                close: b.close,
            })
            .collect();
        let volumes = bars
            .iter()
            .map(|b| VolumePoint {
                time: b.date,
                value: b.volume.unwrap_or(0.0),
                up: b.is_up(),
            })
            .collect();
        Self { candles, volumes }
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((self.candles.first()?.time, self.candles.last()?.time))
    }
}

/// Latest close and day-over-day change shown above the chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub last_close: f64,
    pub change_pct: f64,
    pub bar_count: usize,
}

pub fn summarize(bars: &[Bar]) -> Option<SeriesSummary> {
    let last = bars.last()?;
    let change_pct = match bars.len().checked_sub(2).map(|i| &bars[i]) {
        Some(prev) if prev.close != 0.0 => (last.close - prev.close) / prev.close * 100.0,
        _ => 0.0,
    };
    Some(SeriesSummary {
        last_close: last.close,
        change_pct,
        bar_count: bars.len(),
    })
}
