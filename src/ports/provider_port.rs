//! Remote bar provider port.

use crate::domain::bar::Bar;
use crate::domain::error::ProviderError;
use crate::domain::segment::MarketSegment;
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Daily bars in `[from, to]`, in whatever order the provider returns them.
    async fn fetch_daily_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError>;
}
