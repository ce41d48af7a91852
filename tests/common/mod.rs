#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use extremescope::domain::bar::Bar;
use extremescope::domain::context::PanelRequest;
use extremescope::domain::error::{ChartError, ProviderError, ScopeError};
use extremescope::domain::ranking::{IndicatorRow, RankOrder, RankSelection};
use extremescope::domain::record::{IndicatorRecord, InstrumentInfo};
use extremescope::domain::segment::MarketSegment;
use extremescope::ports::chart_port::{
    BarSource, CandlePoint, ChartBackend, ChartModule, ChartSurface, ContainerHost, ContainerId,
    ObserverId, ResizeCallback, SeriesHandle, Size, VolumePoint,
};
use extremescope::ports::data_port::{BarPort, IndicatorPort, InstrumentPort};
use extremescope::ports::provider_port::ProviderPort;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Store and provider
// ---------------------------------------------------------------------------

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> Bar {
    Bar {
        date: date(date_str),
        open: close - 0.5,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: Some(1_000.0),
    }
}

/// `count` consecutive daily bars starting at `start`, closes rising by 1.
pub fn generate_bars(start: &str, count: usize, first_close: f64) -> Vec<Bar> {
    let start = date(start);
    (0..count)
        .map(|i| {
            let close = first_close + i as f64;
            Bar {
                date: start + chrono::Days::new(i as u64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: Some(1_000.0 + i as f64),
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct MockRow {
    pub segment: MarketSegment,
    pub instrument: String,
    pub value: f64,
    pub rank: Option<u32>,
    pub extreme: Option<String>,
}

/// In-memory store that orders and windows rows the way the SQL adapters do.
#[derive(Default)]
pub struct MockStore {
    pub indicators: HashMap<&'static str, Vec<MockRow>>,
    pub records: Vec<IndicatorRecord>,
    pub bars: HashMap<(String, MarketSegment), Vec<Bar>>,
    pub instruments: Vec<InstrumentInfo>,
    pub fail_with: Option<String>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(
        mut self,
        value_column: &'static str,
        segment: MarketSegment,
        instrument: &str,
        value: f64,
        rank: Option<u32>,
    ) -> Self {
        self.indicators.entry(value_column).or_default().push(MockRow {
            segment,
            instrument: instrument.to_string(),
            value,
            rank,
            extreme: None,
        });
        self
    }

    /// Rows for `value_column` ranked 1..=n by descending value.
    pub fn with_ranked_values(
        mut self,
        value_column: &'static str,
        segment: MarketSegment,
        values: &[f64],
    ) -> Self {
        let mut order: Vec<usize> = (0..values.len()).collect();
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
        let rows = self.indicators.entry(value_column).or_default();
        for (rank, &i) in order.iter().enumerate() {
            rows.push(MockRow {
                segment,
                instrument: format!("SYM{i:03}"),
                value: values[i],
                rank: Some(rank as u32 + 1),
                extreme: None,
            });
        }
        self
    }

    pub fn with_record(mut self, record: IndicatorRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn with_bars(mut self, instrument: &str, segment: MarketSegment, bars: Vec<Bar>) -> Self {
        self.bars.insert((instrument.to_string(), segment), bars);
        self
    }

    pub fn with_instrument(mut self, instrument: &str, name: &str, exchange: &str) -> Self {
        self.instruments.push(InstrumentInfo {
            instrument: instrument.to_string(),
            display_name: name.to_string(),
            sector: Some("Technology".to_string()),
            industry: None,
            market_cap: Some(1.5e12),
            exchange: exchange.to_string(),
        });
        self
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), ScopeError> {
        match &self.fail_with {
            Some(reason) => Err(ScopeError::DatabaseQuery {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn window(rows: Vec<MockRow>, offset: u32, limit: u32) -> Vec<MockRow> {
    rows.into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect()
}

impl IndicatorPort for MockStore {
    fn select_ranked(
        &self,
        segment: MarketSegment,
        selection: &RankSelection,
    ) -> Result<Vec<IndicatorRow>, ScopeError> {
        self.check()?;
        let mut rows: Vec<MockRow> = self
            .indicators
            .get(selection.value_column)
            .map(|rows| rows.iter().filter(|r| r.segment == segment).cloned().collect())
            .unwrap_or_default();

        let rows = match selection.order {
            RankOrder::RankWindow { first, last, .. } => {
                rows.retain(|r| r.rank.is_some_and(|k| k >= first && k <= last));
                rows.sort_by_key(|r| r.rank);
                rows
            }
            RankOrder::RankDescending { offset, limit, .. } => {
                rows.sort_by(|a, b| match (a.rank, b.rank) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                });
                window(rows, offset, limit)
            }
            RankOrder::ByValue {
                ascending,
                offset,
                limit,
            } => {
                rows.sort_by(|a, b| a.value.total_cmp(&b.value));
                if !ascending {
                    rows.reverse();
                }
                window(rows, offset, limit)
            }
        };

        Ok(rows
            .into_iter()
            .map(|r| IndicatorRow {
                instrument: r.instrument,
                display_name: None,
                value: r.value,
                stored_rank: selection.rank_column.and(r.rank),
                extreme: selection.extreme_column.and(r.extreme),
            })
            .collect())
    }

    fn fetch_record(
        &self,
        segment: MarketSegment,
        instrument: &str,
    ) -> Result<Option<IndicatorRecord>, ScopeError> {
        self.check()?;
        Ok(self
            .records
            .iter()
            .find(|r| r.segment == segment && r.instrument == instrument)
            .cloned())
    }
}

impl BarPort for MockStore {
    fn fetch_recent_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        count: usize,
    ) -> Result<Vec<Bar>, ScopeError> {
        self.check()?;
        let bars = self
            .bars
            .get(&(instrument.to_string(), segment))
            .cloned()
            .unwrap_or_default();
        let skip = bars.len().saturating_sub(count);
        Ok(bars.into_iter().skip(skip).collect())
    }
}

impl InstrumentPort for MockStore {
    fn fetch_instrument(
        &self,
        instrument: &str,
        _segment: MarketSegment,
    ) -> Result<Option<InstrumentInfo>, ScopeError> {
        self.check()?;
        Ok(self
            .instruments
            .iter()
            .find(|i| i.instrument == instrument)
            .cloned())
    }
}

pub struct MockProvider {
    pub bars: Vec<Bar>,
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockProvider {
    pub fn returning(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            bars: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }
}

#[async_trait]
impl ProviderPort for MockProvider {
    async fn fetch_daily_bars(
        &self,
        _instrument: &str,
        _segment: MarketSegment,
        _from: NaiveDate,
        _to: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        if self.fail {
            return Err(ProviderError::Status(503));
        }
        Ok(self.bars.clone())
    }
}

// ---------------------------------------------------------------------------
// Chart fakes
// ---------------------------------------------------------------------------

/// Everything the recording surfaces did, shared across surfaces.
#[derive(Debug, Default)]
pub struct SurfaceLog {
    pub created: usize,
    pub disposed: usize,
    pub price_attempts: usize,
    /// Candle sets successfully applied, in order.
    pub applied: Vec<Vec<CandlePoint>>,
    pub volumes: Vec<Vec<VolumePoint>>,
    pub fits: usize,
    pub resizes: Vec<Size>,
}

impl SurfaceLog {
    pub fn live_surfaces(&self) -> usize {
        self.created - self.disposed
    }
}

/// Backend whose module loads can be held back with [`GatedBackend::gate`].
pub struct GatedBackend {
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    pub loads: Cell<usize>,
    pub log: Rc<RefCell<SurfaceLog>>,
    /// Remaining `set_price_data` calls that report the series as unattached.
    pub unattached_failures: Rc<Cell<u32>>,
    pub fail_load: Cell<bool>,
}

impl GatedBackend {
    pub fn new() -> Self {
        Self {
            gates: RefCell::new(VecDeque::new()),
            loads: Cell::new(0),
            log: Rc::new(RefCell::new(SurfaceLog::default())),
            unattached_failures: Rc::new(Cell::new(0)),
            fail_load: Cell::new(false),
        }
    }

    /// The next `load_module` call waits until the returned sender fires
    /// (or is dropped).
    pub fn gate(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().push_back(rx);
        tx
    }
}

#[async_trait(?Send)]
impl ChartBackend for GatedBackend {
    async fn load_module(&self) -> Result<Box<dyn ChartModule>, ChartError> {
        self.loads.set(self.loads.get() + 1);
        let gate = self.gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_load.get() {
            return Err(ChartError::ModuleLoad("renderer bundle missing".to_string()));
        }
        Ok(Box::new(RecordingModule {
            log: Rc::clone(&self.log),
            unattached_failures: Rc::clone(&self.unattached_failures),
        }))
    }
}

struct RecordingModule {
    log: Rc<RefCell<SurfaceLog>>,
    unattached_failures: Rc<Cell<u32>>,
}

impl ChartModule for RecordingModule {
    fn create_surface(
        &self,
        _container: ContainerId,
        _size: Size,
    ) -> Result<Box<dyn ChartSurface>, ChartError> {
        self.log.borrow_mut().created += 1;
        Ok(Box::new(RecordingSurface {
            log: Rc::clone(&self.log),
            unattached_failures: Rc::clone(&self.unattached_failures),
            next_handle: 0,
            staged: Vec::new(),
        }))
    }
}

struct RecordingSurface {
    log: Rc<RefCell<SurfaceLog>>,
    unattached_failures: Rc<Cell<u32>>,
    next_handle: u32,
    staged: Vec<CandlePoint>,
}

impl ChartSurface for RecordingSurface {
    fn add_price_series(&mut self) -> Result<SeriesHandle, ChartError> {
        self.next_handle += 1;
        Ok(SeriesHandle(self.next_handle))
    }

    fn add_volume_series(&mut self) -> Result<SeriesHandle, ChartError> {
        self.next_handle += 1;
        Ok(SeriesHandle(self.next_handle))
    }

    fn set_price_data(
        &mut self,
        _series: SeriesHandle,
        points: &[CandlePoint],
    ) -> Result<(), ChartError> {
        self.log.borrow_mut().price_attempts += 1;
        let remaining = self.unattached_failures.get();
        if remaining > 0 {
            self.unattached_failures.set(remaining - 1);
            return Err(ChartError::SeriesNotAttached);
        }
        self.staged = points.to_vec();
        Ok(())
    }

    fn set_volume_data(
        &mut self,
        _series: SeriesHandle,
        points: &[VolumePoint],
    ) -> Result<(), ChartError> {
        let mut log = self.log.borrow_mut();
        log.applied.push(std::mem::take(&mut self.staged));
        log.volumes.push(points.to_vec());
        Ok(())
    }

    fn fit_content(&mut self) {
        self.log.borrow_mut().fits += 1;
    }

    fn resize(&mut self, size: Size) {
        self.log.borrow_mut().resizes.push(size);
    }

    fn dispose(self: Box<Self>) {
        self.log.borrow_mut().disposed += 1;
    }
}

pub struct FakeHost {
    observers: RefCell<BTreeMap<u64, (ContainerId, ResizeCallback)>>,
    next_id: Cell<u64>,
    pub size: Size,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            observers: RefCell::new(BTreeMap::new()),
            next_id: Cell::new(0),
            size: Size {
                width: 800,
                height: 400,
            },
        }
    }

    pub fn live_observers(&self) -> usize {
        self.observers.borrow().len()
    }

    pub fn fire_resize(&self, container: ContainerId, size: Size) {
        for (observed, callback) in self.observers.borrow().values() {
            if *observed == container {
                callback(size);
            }
        }
    }
}

impl ContainerHost for FakeHost {
    fn measure(&self, _container: ContainerId) -> Size {
        self.size
    }

    fn observe_resize(&self, container: ContainerId, callback: ResizeCallback) -> ObserverId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.observers.borrow_mut().insert(id, (container, callback));
        ObserverId(id)
    }

    fn unobserve(&self, observer: ObserverId) {
        self.observers.borrow_mut().remove(&observer.0);
    }
}

/// Bar source with per-instrument latency.
#[derive(Default)]
pub struct FakeBarSource {
    pub bars: HashMap<String, Vec<Bar>>,
    pub names: HashMap<String, String>,
    pub delays: HashMap<String, Duration>,
    pub failing: Vec<String>,
    pub requests: RefCell<Vec<PanelRequest>>,
}

impl FakeBarSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, instrument: &str, name: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(instrument.to_string(), bars);
        self.names.insert(instrument.to_string(), name.to_string());
        self
    }

    pub fn delayed(mut self, instrument: &str, delay: Duration) -> Self {
        self.delays.insert(instrument.to_string(), delay);
        self
    }

    pub fn failing_for(mut self, instrument: &str) -> Self {
        self.failing.push(instrument.to_string());
        self
    }
}

#[async_trait(?Send)]
impl BarSource for FakeBarSource {
    async fn fetch_bars(&self, request: &PanelRequest) -> Result<Vec<Bar>, ChartError> {
        self.requests.borrow_mut().push(request.clone());
        if let Some(delay) = self.delays.get(&request.instrument) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(&request.instrument) {
            return Err(ChartError::Fetch("connection refused".to_string()));
        }
        let bars = self.bars.get(&request.instrument).cloned().unwrap_or_default();
        let skip = bars.len().saturating_sub(request.bar_count());
        Ok(bars.into_iter().skip(skip).collect())
    }

    async fn instrument_name(
        &self,
        instrument: &str,
        _segment: MarketSegment,
    ) -> Result<Option<String>, ChartError> {
        Ok(self.names.get(instrument).cloned())
    }
}
