//! Time-series reconciliation.
//!
//! Local bars are authoritative. When the store is short, a remote window is
//! requested and only dates absent locally are blended in.

use crate::domain::bar::Bar;
use crate::domain::error::ScopeError;
use crate::domain::segment::MarketSegment;
use crate::ports::data_port::BarPort;
use crate::ports::provider_port::ProviderPort;
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const DEFAULT_BAR_LIMIT: usize = 200;
pub const MAX_BAR_LIMIT: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Database,
    Provider,
    None,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Database => "database",
            Source::Provider => "provider",
            Source::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledSeries {
    pub bars: Vec<Bar>,
    pub source: Source,
}

/// Calendar window wide enough to hold `desired` trading days.
pub fn provider_window(today: NaiveDate, desired: usize) -> (NaiveDate, NaiveDate) {
    let span = (desired as u64).saturating_mul(2);
    let from = today.checked_sub_days(Days::new(span)).unwrap_or(NaiveDate::MIN);
    (from, today)
}

/// Merge `remote` into `local` (local wins on date conflicts), sort ascending
/// and keep the most recent `desired` bars. Returns the merged bars and how
/// many remote bars survived the truncation.
pub fn merge_bars(local: Vec<Bar>, remote: Vec<Bar>, desired: usize) -> (Vec<Bar>, usize) {
    let mut merged: BTreeMap<NaiveDate, (Bar, bool)> = BTreeMap::new();
    for bar in remote {
        merged.insert(bar.date, (bar, true));
    }
    for bar in local {
        merged.insert(bar.date, (bar, false));
    }

    let skip = merged.len().saturating_sub(desired);
    let mut remote_kept = 0;
    let bars: Vec<Bar> = merged
        .into_values()
        .skip(skip)
        .map(|(bar, is_remote)| {
            if is_remote {
                remote_kept += 1;
            }
            bar
        })
        .collect();
    (bars, remote_kept)
}

/// Produce up to `desired` most recent bars for one instrument.
///
/// A store failure is fatal. A provider failure (or a missing provider) is
/// logged and the local bars are served alone.
pub async fn get_bars<S: BarPort + ?Sized>(
    store: &S,
    provider: Option<&dyn ProviderPort>,
    instrument: &str,
    segment: MarketSegment,
    desired: usize,
    today: NaiveDate,
) -> Result<ReconciledSeries, ScopeError> {
    let local = store.fetch_recent_bars(instrument, segment, desired)?;

    let remote = if local.len() < desired {
        match provider {
            Some(provider) => {
                let (from, to) = provider_window(today, desired);
                debug!(
                    instrument,
                    %segment,
                    local = local.len(),
                    desired,
                    %from,
                    %to,
                    "store short of bars, asking provider"
                );
                match provider.fetch_daily_bars(instrument, segment, from, to).await {
                    Ok(bars) => bars,
                    Err(e) => {
                        warn!(instrument, %segment, error = %e, "provider fetch failed, serving local bars");
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        }
    } else {
        Vec::new()
    };

    let (bars, remote_kept) = merge_bars(local, remote, desired);
    let source = if bars.is_empty() {
        Source::None
    } else if remote_kept > 0 {
        Source::Provider
    } else {
        Source::Database
    };

    Ok(ReconciledSeries { bars, source })
}
