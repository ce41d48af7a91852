//! Rendering surface and client-side data ports used by the chart controller.
//!
//! Everything here runs on one event-loop thread, so none of these traits
//! require `Send`.

use crate::domain::bar::Bar;
use crate::domain::context::PanelRequest;
use crate::domain::error::ChartError;
use crate::domain::segment::MarketSegment;
use async_trait::async_trait;
use chrono::NaiveDate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeriesHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct CandlePoint {
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumePoint {
    pub time: NaiveDate,
    pub value: f64,
    pub up: bool,
}

/// Lazily loaded renderer.
#[async_trait(?Send)]
pub trait ChartBackend {
    async fn load_module(&self) -> Result<Box<dyn ChartModule>, ChartError>;
}

pub trait ChartModule {
    fn create_surface(
        &self,
        container: ContainerId,
        size: Size,
    ) -> Result<Box<dyn ChartSurface>, ChartError>;
}

pub trait ChartSurface {
    fn add_price_series(&mut self) -> Result<SeriesHandle, ChartError>;
    fn add_volume_series(&mut self) -> Result<SeriesHandle, ChartError>;

    /// May fail with [`ChartError::SeriesNotAttached`] while the renderer is
    /// still wiring the series up; callers retry.
    fn set_price_data(
        &mut self,
        series: SeriesHandle,
        points: &[CandlePoint],
    ) -> Result<(), ChartError>;
    fn set_volume_data(
        &mut self,
        series: SeriesHandle,
        points: &[VolumePoint],
    ) -> Result<(), ChartError>;

    fn fit_content(&mut self);
    fn resize(&mut self, size: Size);
    fn dispose(self: Box<Self>);
}

pub type ResizeCallback = Box<dyn Fn(Size)>;

/// The presentation layer's view of rendering containers.
pub trait ContainerHost {
    fn measure(&self, container: ContainerId) -> Size;
    /// The callback receives the container's new measured size.
    fn observe_resize(&self, container: ContainerId, callback: ResizeCallback) -> ObserverId;
    fn unobserve(&self, observer: ObserverId);
}

/// Where the chart controller gets its bars from.
#[async_trait(?Send)]
pub trait BarSource {
    async fn fetch_bars(&self, request: &PanelRequest) -> Result<Vec<Bar>, ChartError>;

    async fn instrument_name(
        &self,
        instrument: &str,
        segment: MarketSegment,
    ) -> Result<Option<String>, ChartError>;
}
