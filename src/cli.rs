//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;
use tracing::{error, info};

use crate::adapters::bar_source::{HttpBarSource, ReconcilingBarSource};
use crate::adapters::eodhd_provider::EodhdProvider;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::svg_chart::{StaticContainerHost, SvgChartBackend};
use crate::domain::catalog::CATALOG;
use crate::domain::chart::{ChartController, PanelView};
use crate::domain::config_validation::{chart_settings, validate_service_config};
use crate::domain::context::{PanelRequest, Timeframe};
use crate::domain::dashboard;
use crate::domain::error::ScopeError;
use crate::domain::ranking::{get_ranked_page, RankQuery, View};
use crate::domain::reconcile::{self, MAX_BAR_LIMIT};
use crate::domain::segment::MarketSegment;
use crate::ports::chart_port::{BarSource, ContainerId, Size};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::StorePort;
use crate::ports::provider_port::ProviderPort;

#[derive(Parser, Debug)]
#[command(name = "extremescope", about = "Indicator extremes and price charts for equity segments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the JSON API server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print one ranked page of an indicator
    Rank {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        indicator: String,
        #[arg(short, long, default_value = "NSE")]
        segment: String,
        #[arg(long, default_value = "top")]
        view: String,
        #[arg(long, default_value_t = 0)]
        offset: i64,
        #[arg(short, long, default_value_t = 10)]
        limit: i64,
    },
    /// Print reconciled daily bars for an instrument
    Bars {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(short, long, default_value = "NSE")]
        segment: String,
        #[arg(short, long, default_value_t = 200)]
        limit: i64,
    },
    /// Show instrument metadata and indicator readings
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(short, long, default_value = "NSE")]
        segment: String,
    },
    /// List the indicator catalog
    Indicators,
    /// Render an instrument's chart to an SVG file
    Chart {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        instrument: String,
        #[arg(short, long, default_value = "NSE")]
        segment: String,
        /// 1M, 3M, 6M, 200D or 1Y; defaults to [chart] default_timeframe
        #[arg(short, long)]
        timeframe: Option<String>,
        #[arg(short, long)]
        output: PathBuf,
        /// Fetch through a running server instead of the local store
        #[arg(long)]
        server: Option<String>,
        #[arg(long, default_value_t = 1000)]
        width: u32,
        #[arg(long, default_value_t = 500)]
        height: u32,
    },
    /// Create the SQLite schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::Rank {
            config,
            indicator,
            segment,
            view,
            offset,
            limit,
        } => run_rank(&config, &indicator, &segment, &view, offset, limit),
        Command::Bars {
            config,
            instrument,
            segment,
            limit,
        } => run_bars(&config, &instrument, &segment, limit),
        Command::Info {
            config,
            instrument,
            segment,
        } => run_info(&config, &instrument, &segment),
        Command::Indicators => {
            run_indicators();
            Ok(())
        }
        Command::Chart {
            config,
            instrument,
            segment,
            timeframe,
            output,
            server,
            width,
            height,
        } => run_chart(ChartArgs {
            config,
            instrument,
            segment,
            timeframe,
            output,
            server,
            size: Size { width, height },
        }),
        Command::InitDb { config } => run_init_db(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ScopeError> {
    let config = FileConfigAdapter::from_file(path)?;
    validate_service_config(&config)?;
    Ok(config)
}

/// Postgres when a connection string is configured and the feature is on,
/// SQLite otherwise.
pub fn open_store(config: &dyn ConfigPort) -> Result<Arc<dyn StorePort>, ScopeError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            let store = crate::adapters::postgres_adapter::PostgresStore::from_config(config)?;
            return Ok(Arc::new(store));
        }
    }

    #[cfg(feature = "sqlite")]
    let store = crate::adapters::sqlite_adapter::SqliteStore::from_config(config)
        .map(|s| Arc::new(s) as Arc<dyn StorePort>);
    #[cfg(not(feature = "sqlite"))]
    let store = {
        let _ = config;
        Err(ScopeError::ConfigMissing {
            section: "postgres".into(),
            key: "connection_string".into(),
        })
    };
    store
}

pub fn open_provider(config: &dyn ConfigPort) -> Result<Option<Arc<dyn ProviderPort>>, ScopeError> {
    let provider = EodhdProvider::from_config(config)?;
    if provider.is_none() {
        info!("provider disabled or no API key configured, serving local bars only");
    }
    Ok(provider.map(|p| Arc::new(p) as Arc<dyn ProviderPort>))
}

fn runtime() -> Result<tokio::runtime::Runtime, ScopeError> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

fn run_serve(config_path: &Path) -> Result<(), ScopeError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{build_router, AppState};
        use crate::domain::config_validation::listen_addr;

        let config = load_config(config_path)?;
        let store = open_store(&config)?;
        let provider = open_provider(&config)?;
        let addr = listen_addr(&config)?;

        let router = build_router(AppState { store, provider });

        tokio::runtime::Runtime::new()?.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "listening");
            axum::serve(listener, router).await?;
            Ok::<(), ScopeError>(())
        })
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(ScopeError::InvalidRequest(
            "web feature is required for serve".to_string(),
        ))
    }
}

fn run_rank(
    config_path: &Path,
    indicator: &str,
    segment: &str,
    view: &str,
    offset: i64,
    limit: i64,
) -> Result<(), ScopeError> {
    let segment: MarketSegment = segment.parse()?;
    let view: View = view.parse()?;
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let query = RankQuery::new(indicator, segment, view, offset, limit);
    let page = get_ranked_page(store.as_ref(), &query, chrono::Utc::now())?;

    if page.entries.is_empty() {
        eprintln!("No entries for {indicator} in {segment}");
        return Ok(());
    }
    println!("{:>5}  {:<16} {:>14}  {}", "rank", "instrument", "value", "extreme");
    for entry in &page.entries {
        println!(
            "{:>5}  {:<16} {:>14.4}  {}",
            entry.rank,
            entry.instrument,
            entry.value,
            entry.extreme.as_deref().unwrap_or("-")
        );
    }
    if page.has_more {
        eprintln!("More entries available from offset {}", query.offset + query.limit);
    }
    Ok(())
}

fn run_bars(
    config_path: &Path,
    instrument: &str,
    segment: &str,
    limit: i64,
) -> Result<(), ScopeError> {
    let segment: MarketSegment = segment.parse()?;
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    let provider = open_provider(&config)?;
    let desired = limit.clamp(1, MAX_BAR_LIMIT as i64) as usize;

    let series = runtime()?.block_on(reconcile::get_bars(
        store.as_ref(),
        provider.as_deref(),
        instrument,
        segment,
        desired,
        chrono::Utc::now().date_naive(),
    ))?;

    println!("date,open,high,low,close,volume");
    for bar in &series.bars {
        println!(
            "{},{},{},{},{},{}",
            bar.date,
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume.map(|v| v.to_string()).unwrap_or_default()
        );
    }
    eprintln!("{} bars, source: {}", series.bars.len(), series.source.as_str());
    Ok(())
}

fn run_info(config_path: &Path, instrument: &str, segment: &str) -> Result<(), ScopeError> {
    let segment: MarketSegment = segment.parse()?;
    let config = load_config(config_path)?;
    let store = open_store(&config)?;

    let info = store
        .fetch_instrument(instrument, segment)?
        .ok_or_else(|| ScopeError::NotFound(format!("instrument {instrument}")))?;
    println!("{} ({})", info.display_name, info.instrument);
    println!("  Exchange:   {}", info.exchange);
    println!("  Sector:     {}", info.sector.as_deref().unwrap_or("-"));
    println!("  Industry:   {}", info.industry.as_deref().unwrap_or("-"));
    if let Some(cap) = info.market_cap {
        println!("  Market cap: {cap:.0}");
    }

    match dashboard::indicator_details(store.as_ref(), segment, instrument) {
        Ok(details) => {
            println!();
            for detail in details {
                println!(
                    "  {:<28} {:>12.4}  rank {:>5}  {}",
                    detail.title,
                    detail.value,
                    detail.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
                    detail.extreme.as_deref().unwrap_or("")
                );
            }
        }
        Err(ScopeError::NotFound(_)) => eprintln!("No indicator record for {instrument}"),
        Err(e) => return Err(e),
    }
    Ok(())
}

fn run_indicators() {
    for def in CATALOG {
        println!(
            "{:<20} {:<11} {:<28} {}",
            def.key,
            def.category.as_str(),
            def.title,
            def.value_column
        );
    }
}

struct ChartArgs {
    config: PathBuf,
    instrument: String,
    segment: String,
    timeframe: Option<String>,
    output: PathBuf,
    server: Option<String>,
    size: Size,
}

fn run_chart(args: ChartArgs) -> Result<(), ScopeError> {
    let segment: MarketSegment = args.segment.parse()?;
    let config = load_config(&args.config)?;
    let (settings, default_timeframe) = chart_settings(&config)?;
    let timeframe = match args.timeframe.as_deref() {
        Some(raw) => raw.parse::<Timeframe>()?,
        None => default_timeframe,
    };

    let source: Rc<dyn BarSource> = match &args.server {
        Some(url) => Rc::new(HttpBarSource::new(url.as_str())),
        None => Rc::new(ReconcilingBarSource::new(
            open_store(&config)?,
            open_provider(&config)?,
        )),
    };

    let request = PanelRequest::new(args.instrument.as_str(), segment, timeframe);
    let title = format!("{} - {} - {}", request.instrument, segment, timeframe.label());
    let backend = Rc::new(SvgChartBackend::with_title(title));
    let output = backend.output();
    let host = Rc::new(StaticContainerHost::new(args.size));

    let rt = runtime()?;
    let local = tokio::task::LocalSet::new();
    let view = local.block_on(&rt, async move {
        let controller = ChartController::new(backend, host, source, settings);
        let mut views = controller.subscribe();
        controller.open(request);
        controller.mount(ContainerId(1));
        let view = wait_settled(&mut views).await;
        controller.close();
        view
    });

    if let Some(err) = &view.error {
        error!(error = %err, "bar fetch failed");
    }
    let svg = output.take().ok_or_else(|| {
        ScopeError::InvalidRequest(format!(
            "chart could not be rendered for {}",
            args.instrument
        ))
    })?;
    std::fs::write(&args.output, svg)?;

    let name = view.display_name.as_deref().unwrap_or(&args.instrument);
    match view.summary {
        Some(summary) => eprintln!(
            "{name}: last close {:.2} ({:+.2}%), {} bars -> {}",
            summary.last_close,
            summary.change_pct,
            summary.bar_count,
            args.output.display()
        ),
        None => eprintln!("{name}: no chart data -> {}", args.output.display()),
    }
    Ok(())
}

async fn wait_settled(views: &mut tokio::sync::watch::Receiver<PanelView>) -> PanelView {
    loop {
        let view = views.borrow_and_update().clone();
        if view.settled() {
            return view;
        }
        if views.changed().await.is_err() {
            return view;
        }
    }
}

fn run_init_db(config_path: &Path) -> Result<(), ScopeError> {
    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteStore;

        let config = load_config(config_path)?;
        let store = SqliteStore::from_config(&config)?;
        store.initialize_schema()?;
        info!(path = ?config.get_string("sqlite", "path"), "schema initialized");
        Ok(())
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config_path;
        Err(ScopeError::InvalidRequest(
            "sqlite feature is required for init-db".to_string(),
        ))
    }
}
