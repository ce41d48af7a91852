//! Chart lifecycle controller.
//!
//! Owns the rendering surface of one detail panel across open/close cycles.
//! The presentation layer only reports events (`open`, `mount`, `unmount`,
//! selection changes, `close`); the controller sequences renderer loading,
//! data fetches and data application on the current thread's `LocalSet`.
//!
//! Guarantees:
//! - at most one session is `Initializing` or `Ready` at a time;
//! - an initialization that completes after its session was torn down
//!   disposes of what it built;
//! - a fetch response is dropped unless its epoch is still current;
//! - the resize observer lives exactly as long as the `Ready` session.

pub mod series;
pub mod session;

pub use series::{summarize, SeriesData, SeriesSummary};
pub use session::{ChartSession, LifecyclePhase};

use crate::domain::context::{PanelRequest, Timeframe};
use crate::domain::error::ChartError;
use crate::ports::chart_port::{
    BarSource, ChartBackend, ChartModule, ChartSurface, ContainerHost, ContainerId, SeriesHandle,
    Size,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSettings {
    /// Retries after the first failed attempt to apply data.
    pub apply_retry_limit: u32,
    pub apply_retry_backoff: Duration,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            apply_retry_limit: 5,
            apply_retry_backoff: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartDataState {
    /// Nothing to show.
    Empty,
    /// Data fetched, waiting for a ready surface.
    Pending,
    Applied,
    /// Rendering failed; the panel stays usable without a chart.
    Unavailable,
}

/// Snapshot published to the presentation layer after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub phase: LifecyclePhase,
    pub request: Option<PanelRequest>,
    pub epoch: u64,
    pub loading: bool,
    pub no_data: bool,
    pub chart: ChartDataState,
    pub display_name: Option<String>,
    pub summary: Option<SeriesSummary>,
    pub error: Option<String>,
}

impl PanelView {
    fn closed() -> Self {
        Self {
            phase: LifecyclePhase::Closed,
            request: None,
            epoch: 0,
            loading: false,
            no_data: false,
            chart: ChartDataState::Empty,
            display_name: None,
            summary: None,
            error: None,
        }
    }

    /// No fetch, initialization or data application is outstanding.
    pub fn settled(&self) -> bool {
        match self.phase {
            LifecyclePhase::Closed | LifecyclePhase::Failed => !self.loading,
            LifecyclePhase::AwaitingContainer | LifecyclePhase::Initializing => false,
            LifecyclePhase::Ready => !self.loading && self.chart != ChartDataState::Pending,
        }
    }
}

struct PendingData {
    epoch: u64,
    data: SeriesData,
}

struct Inner {
    phase: LifecyclePhase,
    request: Option<PanelRequest>,
    epoch: u64,
    next_session_id: u64,
    session: Option<ChartSession>,
    pending: Option<PendingData>,
    loading: bool,
    no_data: bool,
    chart: ChartDataState,
    display_name: Option<String>,
    summary: Option<SeriesSummary>,
    error: Option<String>,
}

impl Inner {
    fn new() -> Self {
        Self {
            phase: LifecyclePhase::Closed,
            request: None,
            epoch: 0,
            next_session_id: 0,
            session: None,
            pending: None,
            loading: false,
            no_data: false,
            chart: ChartDataState::Empty,
            display_name: None,
            summary: None,
            error: None,
        }
    }

    fn snapshot(&self) -> PanelView {
        PanelView {
            phase: self.phase,
            request: self.request.clone(),
            epoch: self.epoch,
            loading: self.loading,
            no_data: self.no_data,
            chart: self.chart,
            display_name: self.display_name.clone(),
            summary: self.summary,
            error: self.error.clone(),
        }
    }

    fn is_current(&self, session_id: u64) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == session_id)
    }

    fn has_current_data(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.epoch == self.epoch)
    }
}

enum ApplyOutcome {
    Idle,
    Retry { session_id: u64 },
}

struct Shared {
    inner: RefCell<Inner>,
    backend: Rc<dyn ChartBackend>,
    host: Rc<dyn ContainerHost>,
    source: Rc<dyn BarSource>,
    settings: ChartSettings,
    view_tx: watch::Sender<PanelView>,
}

impl Shared {
    fn publish(&self) {
        let view = self.inner.borrow().snapshot();
        self.view_tx.send_replace(view);
    }

    /// Container of `session_id` if it is still the session being initialized.
    fn initializing_container(&self, session_id: u64) -> Option<ContainerId> {
        let inner = self.inner.borrow();
        if inner.phase != LifecyclePhase::Initializing {
            return None;
        }
        inner
            .session
            .as_ref()
            .filter(|s| s.id == session_id)
            .map(|s| s.container)
    }

    fn fail(&self, session_id: u64, err: ChartError) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.is_current(session_id) {
                return;
            }
            error!(session_id, error = %err, "chart initialization failed");
            inner.phase = LifecyclePhase::Failed;
            inner.chart = ChartDataState::Unavailable;
            inner.session = None;
        }
        self.publish();
    }

    fn resize(&self, session_id: u64, size: Size) {
        let mut inner = self.inner.borrow_mut();
        if inner.phase != LifecyclePhase::Ready {
            return;
        }
        if let Some(surface) = inner
            .session
            .as_mut()
            .filter(|s| s.id == session_id)
            .and_then(|s| s.surface_mut())
        {
            debug!(session_id, width = size.width, height = size.height, "resizing chart");
            surface.resize(size);
        }
    }

    fn apply_pending(&self) -> ApplyOutcome {
        let mut guard = self.inner.borrow_mut();
        let inner = &mut *guard;
        if inner.phase != LifecyclePhase::Ready {
            return ApplyOutcome::Idle;
        }
        let (Some(pending), Some(session)) = (inner.pending.as_ref(), inner.session.as_mut())
        else {
            return ApplyOutcome::Idle;
        };
        if pending.epoch != inner.epoch
            || session.applied_epoch == Some(pending.epoch)
            || session.retry_scheduled
        {
            return ApplyOutcome::Idle;
        }

        match session.apply(&pending.data) {
            Ok(()) => {
                debug!(session_id = session.id, epoch = pending.epoch, "chart data applied");
                session.applied_epoch = Some(pending.epoch);
                session.retry_count = 0;
                inner.chart = if pending.data.is_empty() {
                    ChartDataState::Empty
                } else {
                    ChartDataState::Applied
                };
                ApplyOutcome::Idle
            }
            Err(ChartError::SeriesNotAttached)
                if session.retry_count < self.settings.apply_retry_limit =>
            {
                session.retry_count += 1;
                session.retry_scheduled = true;
                debug!(session_id = session.id, attempt = session.retry_count, "series not attached yet, retrying");
                ApplyOutcome::Retry {
                    session_id: session.id,
                }
            }
            Err(e) => {
                warn!(
                    session_id = session.id,
                    retries = session.retry_count,
                    error = %e,
                    "giving up on chart data"
                );
                session.applied_epoch = Some(pending.epoch);
                inner.chart = ChartDataState::Unavailable;
                ApplyOutcome::Idle
            }
        }
    }
}

/// Lifecycle controller for one chart panel.
///
/// Must be driven from inside a `tokio::task::LocalSet`.
pub struct ChartController {
    shared: Rc<Shared>,
}

impl ChartController {
    pub fn new(
        backend: Rc<dyn ChartBackend>,
        host: Rc<dyn ContainerHost>,
        source: Rc<dyn BarSource>,
        settings: ChartSettings,
    ) -> Self {
        let (view_tx, _) = watch::channel(PanelView::closed());
        Self {
            shared: Rc::new(Shared {
                inner: RefCell::new(Inner::new()),
                backend,
                host,
                source,
                settings,
                view_tx,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PanelView> {
        self.shared.view_tx.subscribe()
    }

    pub fn view(&self) -> PanelView {
        self.shared.inner.borrow().snapshot()
    }

    /// Open the panel (or switch it to `request` if already open).
    pub fn open(&self, request: PanelRequest) {
        let already_open = self.shared.inner.borrow().phase != LifecyclePhase::Closed;
        if already_open {
            self.change_request(request);
            return;
        }
        {
            let mut inner = self.shared.inner.borrow_mut();
            debug!(instrument = %request.instrument, segment = %request.segment, "panel opened");
            inner.phase = LifecyclePhase::AwaitingContainer;
            inner.request = Some(request);
        }
        issue_fetch(&self.shared);
    }

    pub fn select_instrument(&self, instrument: &str) {
        let current = self.shared.inner.borrow().request.clone();
        match current {
            Some(mut request) => {
                request.instrument = instrument.to_string();
                self.change_request(request);
            }
            None => debug!(instrument, "instrument selected while closed, ignoring"),
        }
    }

    pub fn select_timeframe(&self, timeframe: Timeframe) {
        let current = self.shared.inner.borrow().request.clone();
        match current {
            Some(mut request) => {
                request.timeframe = timeframe;
                self.change_request(request);
            }
            None => debug!(%timeframe, "timeframe selected while closed, ignoring"),
        }
    }

    fn change_request(&self, request: PanelRequest) {
        {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.request.as_ref() == Some(&request) {
                return;
            }
            inner.request = Some(request);
        }
        issue_fetch(&self.shared);
    }

    /// The rendering container became available.
    pub fn mount(&self, container: ContainerId) {
        let session_id = {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.phase != LifecyclePhase::AwaitingContainer {
                debug!(phase = ?inner.phase, container = container.0, "mount ignored");
                return;
            }
            inner.next_session_id += 1;
            let id = inner.next_session_id;
            inner.session = Some(ChartSession::new(id, container));
            inner.phase = LifecyclePhase::Initializing;
            debug!(session_id = id, container = container.0, "initializing chart");
            id
        };
        self.shared.publish();
        tokio::task::spawn_local(initialize(Rc::clone(&self.shared), session_id));
    }

    /// The rendering container went away while the panel stays open.
    pub fn unmount(&self) {
        let session = {
            let mut inner = self.shared.inner.borrow_mut();
            // Failed stays failed until the panel is closed.
            if matches!(
                inner.phase,
                LifecyclePhase::Closed | LifecyclePhase::AwaitingContainer | LifecyclePhase::Failed
            ) {
                return;
            }
            inner.phase = LifecyclePhase::AwaitingContainer;
            if inner.has_current_data() {
                inner.chart = ChartDataState::Pending;
            }
            inner.session.take()
        };
        if let Some(session) = session {
            debug!(session_id = session.id, "container unmounted, tearing down");
            session.teardown(self.shared.host.as_ref());
        }
        self.shared.publish();
    }

    pub fn close(&self) {
        let session = {
            let mut inner = self.shared.inner.borrow_mut();
            if inner.phase == LifecyclePhase::Closed {
                return;
            }
            inner.epoch += 1;
            inner.phase = LifecyclePhase::Closed;
            inner.request = None;
            inner.pending = None;
            inner.loading = false;
            inner.no_data = false;
            inner.chart = ChartDataState::Empty;
            inner.display_name = None;
            inner.summary = None;
            inner.error = None;
            inner.session.take()
        };
        if let Some(session) = session {
            debug!(session_id = session.id, "panel closed, tearing down");
            session.teardown(self.shared.host.as_ref());
        }
        self.shared.publish();
    }
}

impl Drop for ChartController {
    fn drop(&mut self) {
        self.close();
    }
}

fn issue_fetch(shared: &Rc<Shared>) {
    let (epoch, request) = {
        let mut inner = shared.inner.borrow_mut();
        let Some(request) = inner.request.clone() else {
            return;
        };
        inner.epoch += 1;
        inner.loading = true;
        inner.error = None;
        (inner.epoch, request)
    };
    shared.publish();
    tokio::task::spawn_local(fetch(Rc::clone(shared), epoch, request));
}

async fn fetch(shared: Rc<Shared>, epoch: u64, request: PanelRequest) {
    let (bars, name) = futures::join!(
        shared.source.fetch_bars(&request),
        shared
            .source
            .instrument_name(&request.instrument, request.segment)
    );

    {
        let mut inner = shared.inner.borrow_mut();
        if inner.epoch != epoch {
            debug!(epoch, current = inner.epoch, instrument = %request.instrument, "dropping stale response");
            return;
        }
        inner.loading = false;
        match name {
            Ok(name) => inner.display_name = name,
            Err(e) => debug!(error = %e, "instrument name unavailable"),
        }
        let data = match bars {
            Ok(bars) => {
                inner.summary = summarize(&bars);
                inner.no_data = bars.is_empty();
                SeriesData::from_bars(&bars)
            }
            Err(e) => {
                warn!(instrument = %request.instrument, error = %e, "bar fetch failed");
                inner.error = Some(e.to_string());
                inner.summary = None;
                inner.no_data = true;
                SeriesData::default()
            }
        };
        inner.pending = Some(PendingData { epoch, data });
        inner.chart = if inner.phase == LifecyclePhase::Failed {
            ChartDataState::Unavailable
        } else {
            ChartDataState::Pending
        };
        if let Some(session) = inner.session.as_mut() {
            session.retry_count = 0;
        }
    }

    try_apply(&shared);
}

async fn initialize(shared: Rc<Shared>, session_id: u64) {
    let loaded = shared.backend.load_module().await;

    let Some(container) = shared.initializing_container(session_id) else {
        debug!(session_id, "initialization superseded, discarding renderer");
        return;
    };
    let module = match loaded {
        Ok(module) => module,
        Err(e) => return shared.fail(session_id, e),
    };

    let size = shared.host.measure(container);
    let (surface, price, volume) = match build_surface(module.as_ref(), container, size) {
        Ok(parts) => parts,
        Err(e) => return shared.fail(session_id, e),
    };

    let weak = Rc::downgrade(&shared);
    let observer = shared.host.observe_resize(
        container,
        Box::new(move |size| {
            if let Some(shared) = weak.upgrade() {
                shared.resize(session_id, size);
            }
        }),
    );

    let leftover = {
        let mut inner = shared.inner.borrow_mut();
        let current = inner.phase == LifecyclePhase::Initializing && inner.is_current(session_id);
        match inner.session.as_mut() {
            Some(session) if current => {
                session.attach(surface, price, volume, observer);
                inner.phase = LifecyclePhase::Ready;
                None
            }
            _ => Some(surface),
        }
    };
    if let Some(surface) = leftover {
        shared.host.unobserve(observer);
        surface.dispose();
        return;
    }

    debug!(session_id, "chart ready");
    try_apply(&shared);
}

fn build_surface(
    module: &dyn ChartModule,
    container: ContainerId,
    size: Size,
) -> Result<(Box<dyn ChartSurface>, SeriesHandle, SeriesHandle), ChartError> {
    let mut surface = module.create_surface(container, size)?;
    let series = surface
        .add_price_series()
        .and_then(|price| surface.add_volume_series().map(|volume| (price, volume)));
    match series {
        Ok((price, volume)) => Ok((surface, price, volume)),
        Err(e) => {
            surface.dispose();
            Err(e)
        }
    }
}

fn try_apply(shared: &Rc<Shared>) {
    let outcome = shared.apply_pending();
    shared.publish();

    if let ApplyOutcome::Retry { session_id } = outcome {
        let shared = Rc::clone(shared);
        tokio::task::spawn_local(async move {
            tokio::time::sleep(shared.settings.apply_retry_backoff).await;
            let current = {
                let mut inner = shared.inner.borrow_mut();
                match inner.session.as_mut() {
                    Some(session) if session.id == session_id => {
                        session.retry_scheduled = false;
                        true
                    }
                    _ => false,
                }
            };
            if current {
                try_apply(&shared);
            }
        });
    }
}
