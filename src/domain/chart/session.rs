//! One live rendering session and its owned handles.

use crate::domain::chart::series::SeriesData;
use crate::domain::error::ChartError;
use crate::ports::chart_port::{ChartSurface, ContainerHost, ContainerId, ObserverId, SeriesHandle};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Closed,
    AwaitingContainer,
    Initializing,
    Ready,
    Failed,
}

impl LifecyclePhase {
    /// Phases in which a session owns (or is about to own) a renderer.
    pub fn is_live(&self) -> bool {
        matches!(self, LifecyclePhase::Initializing | LifecyclePhase::Ready)
    }
}

/// Handles owned exclusively by one panel session.
pub struct ChartSession {
    pub id: u64,
    pub container: ContainerId,
    surface: Option<Box<dyn ChartSurface>>,
    price_series: Option<SeriesHandle>,
    volume_series: Option<SeriesHandle>,
    observer: Option<ObserverId>,
    /// Epoch of the data set last pushed into the series.
    pub applied_epoch: Option<u64>,
    pub retry_count: u32,
    pub retry_scheduled: bool,
}

impl ChartSession {
    pub fn new(id: u64, container: ContainerId) -> Self {
        Self {
            id,
            container,
            surface: None,
            price_series: None,
            volume_series: None,
            observer: None,
            applied_epoch: None,
            retry_count: 0,
            retry_scheduled: false,
        }
    }

    pub fn attach(
        &mut self,
        surface: Box<dyn ChartSurface>,
        price_series: SeriesHandle,
        volume_series: SeriesHandle,
        observer: ObserverId,
    ) {
        self.surface = Some(surface);
        self.price_series = Some(price_series);
        self.volume_series = Some(volume_series);
        self.observer = Some(observer);
    }

    pub fn is_attached(&self) -> bool {
        self.surface.is_some()
    }

    pub fn surface_mut(&mut self) -> Option<&mut (dyn ChartSurface + 'static)> {
        self.surface.as_deref_mut()
    }

    /// Push one data set into both series, then fit the time scale.
    pub fn apply(&mut self, data: &SeriesData) -> Result<(), ChartError> {
        let price = self.price_series.ok_or(ChartError::SeriesNotAttached)?;
        let volume = self.volume_series.ok_or(ChartError::SeriesNotAttached)?;
        let surface = self
            .surface
            .as_deref_mut()
            .ok_or(ChartError::SeriesNotAttached)?;

        surface.set_price_data(price, &data.candles)?;
        surface.set_volume_data(volume, &data.volumes)?;
        surface.fit_content();
        Ok(())
    }

    /// Detach the observer, dispose the surface and clear every handle.
    pub fn teardown(mut self, host: &dyn ContainerHost) {
        if let Some(observer) = self.observer.take() {
            host.unobserve(observer);
        }
        self.price_series = None;
        self.volume_series = None;
        if let Some(surface) = self.surface.take() {
            surface.dispose();
        }
    }
}

impl std::fmt::Debug for ChartSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChartSession")
            .field("id", &self.id)
            .field("container", &self.container)
            .field("attached", &self.is_attached())
            .field("observer", &self.observer)
            .field("applied_epoch", &self.applied_epoch)
            .field("retry_count", &self.retry_count)
            .finish()
    }
}
