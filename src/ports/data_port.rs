//! Persistent store port traits.
//!
//! The store is synchronous; adapters own their connection pools. All three
//! traits are implemented by each store adapter and bundled as [`StorePort`].

use crate::domain::bar::Bar;
use crate::domain::error::ScopeError;
use crate::domain::ranking::{IndicatorRow, RankSelection};
use crate::domain::record::{IndicatorRecord, InstrumentInfo};
use crate::domain::segment::MarketSegment;

pub trait IndicatorPort: Send + Sync {
    /// Rows for one ranked selection, excluding rows whose value is null.
    ///
    /// A column missing from the underlying table must surface as
    /// [`ScopeError::SchemaGap`].
    fn select_ranked(
        &self,
        segment: MarketSegment,
        selection: &RankSelection,
    ) -> Result<Vec<IndicatorRow>, ScopeError>;

    fn fetch_record(
        &self,
        segment: MarketSegment,
        instrument: &str,
    ) -> Result<Option<IndicatorRecord>, ScopeError>;
}

pub trait BarPort: Send + Sync {
    /// Up to `count` most recent bars, returned in ascending date order.
    fn fetch_recent_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        count: usize,
    ) -> Result<Vec<Bar>, ScopeError>;
}

pub trait InstrumentPort: Send + Sync {
    fn fetch_instrument(
        &self,
        instrument: &str,
        segment: MarketSegment,
    ) -> Result<Option<InstrumentInfo>, ScopeError>;
}

pub trait StorePort: IndicatorPort + BarPort + InstrumentPort {}

impl<T: IndicatorPort + BarPort + InstrumentPort + ?Sized> StorePort for T {}
