//! SVG rendering backend for the chart controller.
//!
//! Draws a candlestick pane over a volume histogram. Every `fit_content`
//! re-renders the whole document into a shared [`SvgOutput`] that the caller
//! reads once the controller settles.

use crate::domain::error::ChartError;
use crate::ports::chart_port::{
    CandlePoint, ChartBackend, ChartModule, ChartSurface, ContainerHost, ContainerId, ObserverId,
    ResizeCallback, SeriesHandle, Size, VolumePoint,
};
use async_trait::async_trait;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::rc::Rc;

const MARGIN_LEFT: f64 = 60.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 30.0;
/// Share of the plot height given to the price pane.
const PRICE_SHARE: f64 = 0.75;
const UP_COLOR: &str = "#26a69a";
const DOWN_COLOR: &str = "#ef5350";

/// Last document rendered by any surface of one backend.
#[derive(Clone, Default)]
pub struct SvgOutput(Rc<RefCell<Option<String>>>);

impl SvgOutput {
    pub fn take(&self) -> Option<String> {
        self.0.borrow_mut().take()
    }

    pub fn latest(&self) -> Option<String> {
        self.0.borrow().clone()
    }

    fn store(&self, document: String) {
        *self.0.borrow_mut() = Some(document);
    }
}

#[derive(Default)]
pub struct SvgChartBackend {
    output: SvgOutput,
    title: Option<String>,
}

impl SvgChartBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(title: impl Into<String>) -> Self {
        Self {
            output: SvgOutput::default(),
            title: Some(title.into()),
        }
    }

    pub fn output(&self) -> SvgOutput {
        self.output.clone()
    }
}

#[async_trait(?Send)]
impl ChartBackend for SvgChartBackend {
    async fn load_module(&self) -> Result<Box<dyn ChartModule>, ChartError> {
        Ok(Box::new(SvgModule {
            output: self.output.clone(),
            title: self.title.clone(),
        }))
    }
}

struct SvgModule {
    output: SvgOutput,
    title: Option<String>,
}

impl ChartModule for SvgModule {
    fn create_surface(
        &self,
        container: ContainerId,
        size: Size,
    ) -> Result<Box<dyn ChartSurface>, ChartError> {
        if size.width == 0 || size.height == 0 {
            return Err(ChartError::SurfaceCreate(format!(
                "container {} has zero size",
                container.0
            )));
        }
        Ok(Box::new(SvgSurface {
            size,
            title: self.title.clone(),
            output: self.output.clone(),
            next_handle: 0,
            price: None,
            volume: None,
            candles: Vec::new(),
            volumes: Vec::new(),
        }))
    }
}

struct SvgSurface {
    size: Size,
    title: Option<String>,
    output: SvgOutput,
    next_handle: u32,
    price: Option<SeriesHandle>,
    volume: Option<SeriesHandle>,
    candles: Vec<CandlePoint>,
    volumes: Vec<VolumePoint>,
}

impl SvgSurface {
    fn next_handle(&mut self) -> SeriesHandle {
        self.next_handle += 1;
        SeriesHandle(self.next_handle)
    }

    fn render(&self) {
        self.output.store(render_svg(
            self.size,
            self.title.as_deref(),
            &self.candles,
            &self.volumes,
        ));
    }
}

impl ChartSurface for SvgSurface {
    fn add_price_series(&mut self) -> Result<SeriesHandle, ChartError> {
        let handle = self.next_handle();
        self.price = Some(handle);
        Ok(handle)
    }

    fn add_volume_series(&mut self) -> Result<SeriesHandle, ChartError> {
        let handle = self.next_handle();
        self.volume = Some(handle);
        Ok(handle)
    }

    fn set_price_data(
        &mut self,
        series: SeriesHandle,
        points: &[CandlePoint],
    ) -> Result<(), ChartError> {
        if self.price != Some(series) {
            return Err(ChartError::SeriesNotAttached);
        }
        self.candles = points.to_vec();
        Ok(())
    }

    fn set_volume_data(
        &mut self,
        series: SeriesHandle,
        points: &[VolumePoint],
    ) -> Result<(), ChartError> {
        if self.volume != Some(series) {
            return Err(ChartError::SeriesNotAttached);
        }
        self.volumes = points.to_vec();
        Ok(())
    }

    fn fit_content(&mut self) {
        self.render();
    }

    fn resize(&mut self, size: Size) {
        self.size = size;
        if !self.candles.is_empty() {
            self.render();
        }
    }

    fn dispose(self: Box<Self>) {}
}

/// Render candles and volumes into a standalone SVG document.
pub fn render_svg(
    size: Size,
    title: Option<&str>,
    candles: &[CandlePoint],
    volumes: &[VolumePoint],
) -> String {
    let width = size.width as f64;
    let height = size.height as f64;
    let plot_width = (width - MARGIN_LEFT - MARGIN_RIGHT).max(1.0);
    let plot_height = (height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0);
    let price_height = plot_height * PRICE_SHARE;
    let volume_top = MARGIN_TOP + price_height;
    let volume_height = plot_height - price_height;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg width="{w}" height="{h}" viewBox="0 0 {w} {h}" xmlns="http://www.w3.org/2000/svg">"#,
        w = size.width,
        h = size.height
    );
    svg.push_str("  <rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    if let Some(title) = title {
        let _ = writeln!(
            svg,
            "  <text x=\"{MARGIN_LEFT}\" y=\"18\" font-size=\"13\" fill=\"#333\">{}</text>",
            escape(title)
        );
    }

    if candles.is_empty() {
        let _ = writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"12\" fill=\"#999\">No chart data</text>",
            width / 2.0,
            height / 2.0
        );
        svg.push_str("</svg>\n");
        return svg;
    }

    let min_price = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let max_price = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let price_range = (max_price - min_price).max(f64::EPSILON);
    let price_y = |v: f64| MARGIN_TOP + price_height - ((v - min_price) / price_range) * price_height;

    let slot = plot_width / candles.len() as f64;
    let body_width = (slot * 0.7).max(1.0);
    let slot_x = |i: usize| MARGIN_LEFT + slot * i as f64 + slot / 2.0;

    // Axes
    let _ = writeln!(
        svg,
        "  <line x1=\"{MARGIN_LEFT}\" y1=\"{MARGIN_TOP}\" x2=\"{MARGIN_LEFT}\" y2=\"{:.1}\" stroke=\"#ccc\" stroke-width=\"1\"/>",
        height - MARGIN_BOTTOM
    );
    for (label, value) in [("max", max_price), ("min", min_price)] {
        let _ = writeln!(
            svg,
            "  <text class=\"axis-{label}\" x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10\" fill=\"#666\">{value:.2}</text>",
            MARGIN_LEFT - 5.0,
            price_y(value) + 3.0
        );
    }

    svg.push_str("  <g class=\"candles\">\n");
    for (i, candle) in candles.iter().enumerate() {
        let x = slot_x(i);
        let color = if candle.close >= candle.open { UP_COLOR } else { DOWN_COLOR };
        let top = price_y(candle.open.max(candle.close));
        let bottom = price_y(candle.open.min(candle.close));
        let _ = writeln!(
            svg,
            "    <line x1=\"{x:.1}\" y1=\"{:.1}\" x2=\"{x:.1}\" y2=\"{:.1}\" stroke=\"{color}\" stroke-width=\"1\"/>",
            price_y(candle.high),
            price_y(candle.low)
        );
        let _ = writeln!(
            svg,
            "    <rect x=\"{:.1}\" y=\"{top:.1}\" width=\"{body_width:.1}\" height=\"{:.1}\" fill=\"{color}\"/>",
            x - body_width / 2.0,
            (bottom - top).max(1.0)
        );
    }
    svg.push_str("  </g>\n");

    let max_volume = volumes.iter().map(|v| v.value).fold(0.0, f64::max);
    let positions: BTreeMap<_, _> = candles.iter().enumerate().map(|(i, c)| (c.time, i)).collect();
    svg.push_str("  <g class=\"volume\">\n");
    if max_volume > 0.0 {
        for point in volumes {
            let Some(&i) = positions.get(&point.time) else {
                continue;
            };
            let bar_height = point.value / max_volume * volume_height;
            let color = if point.up { UP_COLOR } else { DOWN_COLOR };
            let _ = writeln!(
                svg,
                "    <rect x=\"{:.1}\" y=\"{:.1}\" width=\"{body_width:.1}\" height=\"{bar_height:.1}\" fill=\"{color}\" fill-opacity=\"0.5\"/>",
                slot_x(i) - body_width / 2.0,
                volume_top + volume_height - bar_height
            );
        }
    }
    svg.push_str("  </g>\n");

    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        let y = height - MARGIN_BOTTOM + 15.0;
        let _ = writeln!(
            svg,
            "  <text x=\"{MARGIN_LEFT}\" y=\"{y:.1}\" font-size=\"10\" fill=\"#666\">{}</text>",
            first.time.format("%Y-%m-%d")
        );
        let _ = writeln!(
            svg,
            "  <text x=\"{:.1}\" y=\"{y:.1}\" text-anchor=\"end\" font-size=\"10\" fill=\"#666\">{}</text>",
            width - MARGIN_RIGHT,
            last.time.format("%Y-%m-%d")
        );
    }

    svg.push_str("</svg>\n");
    svg
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Fixed-size containers for headless rendering. Resizes are driven by
/// [`StaticContainerHost::resize`].
pub struct StaticContainerHost {
    sizes: RefCell<BTreeMap<u64, Size>>,
    default_size: Size,
    observers: RefCell<BTreeMap<u64, (ContainerId, ResizeCallback)>>,
    next_observer: Cell<u64>,
}

impl StaticContainerHost {
    pub fn new(default_size: Size) -> Self {
        Self {
            sizes: RefCell::new(BTreeMap::new()),
            default_size,
            observers: RefCell::new(BTreeMap::new()),
            next_observer: Cell::new(0),
        }
    }

    /// Change a container's size and notify its observers.
    pub fn resize(&self, container: ContainerId, size: Size) {
        self.sizes.borrow_mut().insert(container.0, size);
        let observers = self.observers.borrow();
        for (observed, callback) in observers.values() {
            if *observed == container {
                callback(size);
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }
}

impl ContainerHost for StaticContainerHost {
    fn measure(&self, container: ContainerId) -> Size {
        self.sizes
            .borrow()
            .get(&container.0)
            .copied()
            .unwrap_or(self.default_size)
    }

    fn observe_resize(&self, container: ContainerId, callback: ResizeCallback) -> ObserverId {
        let id = self.next_observer.get() + 1;
        self.next_observer.set(id);
        self.observers.borrow_mut().insert(id, (container, callback));
        ObserverId(id)
    }

    fn unobserve(&self, observer: ObserverId) {
        self.observers.borrow_mut().remove(&observer.0);
    }
}
