//! PostgreSQL store adapter.
//!
//! Reads the same tables as the SQLite adapter from an externally managed
//! database. Columns are cast in SQL so row types never depend on how the
//! upstream batch declared them.

use crate::domain::bar::Bar;
use crate::domain::error::ScopeError;
use crate::domain::ranking::{IndicatorRow, RankOrder, RankSelection};
use crate::domain::record::{rank_from_f64, IndicatorRecord, InstrumentInfo};
use crate::domain::segment::MarketSegment;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{BarPort, IndicatorPort, InstrumentPort};
use chrono::NaiveDate;
use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::NoTls;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

type Param = Box<dyn ToSql + Sync>;

pub struct PostgresStore {
    pool: Pool<PostgresConnectionManager<NoTls>>,
}

impl PostgresStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScopeError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| ScopeError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| ScopeError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4) as u32;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| ScopeError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, ScopeError> {
        self.pool.get().map_err(|e: r2d2::Error| ScopeError::Database {
            reason: e.to_string(),
        })
    }
}

/// SQLSTATE 42703 (undefined column) is a schema gap, not a fault.
fn query_error(segment: MarketSegment, e: postgres::Error) -> ScopeError {
    if e.code() == Some(&SqlState::UNDEFINED_COLUMN) {
        let message = e
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_default();
        let column = message
            .split('"')
            .nth(1)
            .unwrap_or("unknown")
            .to_string();
        return ScopeError::SchemaGap {
            segment: segment.to_string(),
            column,
        };
    }
    ScopeError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn ranked_sql(segment: MarketSegment, selection: &RankSelection) -> (String, Vec<Param>) {
    let schema = segment.schema();
    let value = selection.value_column;
    let rank = selection
        .rank_column
        .map(|c| format!("{c}::double precision"))
        .unwrap_or_else(|| "NULL::double precision".to_string());
    let extreme = selection
        .extreme_column
        .map(|c| format!("{c}::text"))
        .unwrap_or_else(|| "NULL::text".to_string());

    let mut sql = format!(
        "SELECT symbol, company_name, {value}::double precision, {rank}, {extreme} \
         FROM {} WHERE {value} IS NOT NULL",
        schema.table
    );
    let mut params: Vec<Param> = Vec::new();
    if schema.has_exchange_column {
        params.push(Box::new(segment.as_str().to_string()));
        sql.push_str(&format!(" AND exchange = ${}", params.len()));
    }

    let (order_by, window) = match selection.order {
        RankOrder::RankWindow {
            rank_column,
            first,
            last,
        } => {
            params.push(Box::new(first as i64));
            sql.push_str(&format!(" AND {rank_column} >= ${}::bigint", params.len()));
            params.push(Box::new(last as i64));
            sql.push_str(&format!(" AND {rank_column} <= ${}::bigint", params.len()));
            (format!("{rank_column} ASC"), None)
        }
        RankOrder::RankDescending {
            rank_column,
            offset,
            limit,
        } => (
            format!("{rank_column} DESC NULLS LAST"),
            Some((offset, limit)),
        ),
        RankOrder::ByValue {
            ascending,
            offset,
            limit,
        } => {
            let direction = if ascending { "ASC" } else { "DESC" };
            (format!("{value} {direction} NULLS LAST"), Some((offset, limit)))
        }
    };

    sql.push_str(&format!(" ORDER BY {order_by}"));
    if let Some((offset, limit)) = window {
        params.push(Box::new(limit as i64));
        sql.push_str(&format!(" LIMIT ${}::bigint", params.len()));
        params.push(Box::new(offset as i64));
        sql.push_str(&format!(" OFFSET ${}::bigint", params.len()));
    }

    (sql, params)
}

fn as_refs(params: &[Param]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p.as_ref()).collect()
}

impl IndicatorPort for PostgresStore {
    fn select_ranked(
        &self,
        segment: MarketSegment,
        selection: &RankSelection,
    ) -> Result<Vec<IndicatorRow>, ScopeError> {
        let (sql, params) = ranked_sql(segment, selection);
        let rows = self
            .conn()?
            .query(sql.as_str(), &as_refs(&params))
            .map_err(|e| query_error(segment, e))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let stored_rank: Option<f64> = row.get(3);
                IndicatorRow {
                    instrument: row.get(0),
                    display_name: row.get(1),
                    value: row.get(2),
                    stored_rank: stored_rank.and_then(rank_from_f64),
                    extreme: row.get(4),
                }
            })
            .collect())
    }

    fn fetch_record(
        &self,
        segment: MarketSegment,
        instrument: &str,
    ) -> Result<Option<IndicatorRecord>, ScopeError> {
        let schema = segment.schema();
        let mut columns = vec!["symbol".to_string(), "company_name".to_string()];
        columns.extend(
            schema
                .numeric_columns
                .iter()
                .map(|c| format!("{c}::double precision")),
        );
        columns.extend(schema.tag_columns.iter().map(|c| format!("{c}::text")));

        let mut sql = format!(
            "SELECT {} FROM {} WHERE symbol = $1",
            columns.join(", "),
            schema.table
        );
        let mut params: Vec<Param> = vec![Box::new(instrument.to_string())];
        if schema.has_exchange_column {
            sql.push_str(" AND exchange = $2");
            params.push(Box::new(segment.as_str().to_string()));
        }
        sql.push_str(" LIMIT 1");

        let rows = self
            .conn()?
            .query(sql.as_str(), &as_refs(&params))
            .map_err(|e| query_error(segment, e))?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut record = IndicatorRecord::new(row.get::<_, String>(0), segment);
        record.display_name = row.get(1);
        let numeric_start = 2;
        for (i, column) in schema.numeric_columns.iter().enumerate() {
            if let Some(v) = row.get::<_, Option<f64>>(numeric_start + i) {
                record.numeric.insert(*column, v);
            }
        }
        let tag_start = numeric_start + schema.numeric_columns.len();
        for (i, column) in schema.tag_columns.iter().enumerate() {
            if let Some(t) = row.get::<_, Option<String>>(tag_start + i) {
                record.tags.insert(*column, t);
            }
        }
        Ok(Some(record))
    }
}

impl BarPort for PostgresStore {
    fn fetch_recent_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        count: usize,
    ) -> Result<Vec<Bar>, ScopeError> {
        let query = "SELECT trading_date, \
                            open::double precision, high::double precision, \
                            low::double precision, close::double precision, \
                            volume::double precision \
                     FROM ohlc_prices \
                     WHERE symbol = $1 AND exchange = $2 \
                     ORDER BY trading_date DESC \
                     LIMIT $3::bigint";

        let rows = self
            .conn()?
            .query(query, &[&instrument, &segment.as_str(), &(count as i64)])
            .map_err(|e| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|row| Bar {
                date: row.get::<_, NaiveDate>(0),
                open: row.get(1),
                high: row.get(2),
                low: row.get(3),
                close: row.get(4),
                volume: row.get(5),
            })
            .collect();
        bars.reverse();

        Ok(bars)
    }
}

impl InstrumentPort for PostgresStore {
    fn fetch_instrument(
        &self,
        instrument: &str,
        segment: MarketSegment,
    ) -> Result<Option<InstrumentInfo>, ScopeError> {
        let query = "SELECT ticker, company_name, sector, industry, \
                            market_cap::double precision, exchange \
                     FROM symbols \
                     WHERE ticker = $1 AND exchange = $2 \
                     LIMIT 1";

        let rows = self
            .conn()?
            .query(query, &[&instrument, &segment.as_str()])
            .map_err(|e| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(rows.into_iter().next().map(|row| {
            let ticker: String = row.get(0);
            let company: Option<String> = row.get(1);
            InstrumentInfo {
                display_name: company.unwrap_or_else(|| ticker.clone()),
                instrument: ticker,
                sector: row.get(2),
                industry: row.get(3),
                market_cap: row.get(4),
                exchange: row.get(5),
            }
        }))
    }
}
