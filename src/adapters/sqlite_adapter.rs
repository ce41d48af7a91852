//! SQLite store adapter.
//!
//! Indicator tables are created from the segment schemas, so the US table
//! genuinely lacks the NSE-only columns.

use crate::domain::bar::Bar;
use crate::domain::error::ScopeError;
use crate::domain::ranking::{IndicatorRow, RankOrder, RankSelection};
use crate::domain::record::{rank_from_f64, IndicatorRecord, InstrumentInfo};
use crate::domain::segment::{MarketSegment, SegmentSchema};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{BarPort, IndicatorPort, InstrumentPort};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension};

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, ScopeError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| ScopeError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| ScopeError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, ScopeError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| ScopeError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, ScopeError> {
        self.pool.get().map_err(|e: r2d2::Error| ScopeError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), ScopeError> {
        let conn = self.conn()?;

        let mut ddl = String::from(
            "CREATE TABLE IF NOT EXISTS ohlc_prices (
                symbol TEXT NOT NULL,
                exchange TEXT NOT NULL,
                trading_date TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL,
                PRIMARY KEY (symbol, exchange, trading_date)
            );
            CREATE TABLE IF NOT EXISTS symbols (
                ticker TEXT NOT NULL,
                exchange TEXT NOT NULL,
                company_name TEXT,
                sector TEXT,
                industry TEXT,
                market_cap REAL,
                is_active INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (ticker, exchange)
            );",
        );
        for segment in MarketSegment::ALL {
            ddl.push_str(&indicator_table_ddl(segment.schema()));
        }

        conn.execute_batch(&ddl)
            .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    pub fn insert_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        bars: &[Bar],
    ) -> Result<(), ScopeError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO ohlc_prices
                    (symbol, exchange, trading_date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    instrument,
                    segment.as_str(),
                    bar.date.format("%Y-%m-%d").to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Insert or replace one indicator row. Only schema columns are written.
    pub fn insert_record(&self, record: &IndicatorRecord) -> Result<(), ScopeError> {
        let schema = record.segment.schema();
        let mut columns = vec!["symbol", "company_name"];
        let mut values = vec![
            Value::Text(record.instrument.clone()),
            record
                .display_name
                .clone()
                .map(Value::Text)
                .unwrap_or(Value::Null),
        ];
        if schema.has_exchange_column {
            columns.push("exchange");
            values.push(Value::Text(record.segment.as_str().to_string()));
        }
        for column in schema.numeric_columns.iter().copied() {
            columns.push(column);
            values.push(
                record
                    .value(column)
                    .map(Value::Real)
                    .unwrap_or(Value::Null),
            );
        }
        for column in schema.tag_columns.iter().copied() {
            columns.push(column);
            values.push(
                record
                    .tag(column)
                    .map(|t| Value::Text(t.to_string()))
                    .unwrap_or(Value::Null),
            );
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            schema.table,
            columns.join(", "),
            placeholders.join(", ")
        );

        let conn = self.conn()?;
        conn.execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| query_error(record.segment, e))?;
        Ok(())
    }

    pub fn insert_instrument(&self, info: &InstrumentInfo) -> Result<(), ScopeError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO symbols
                (ticker, exchange, company_name, sector, industry, market_cap, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)",
            params![
                info.instrument,
                info.exchange,
                info.display_name,
                info.sector,
                info.industry,
                info.market_cap
            ],
        )
        .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

fn indicator_table_ddl(schema: &SegmentSchema) -> String {
    let mut columns = vec![
        "symbol TEXT NOT NULL".to_string(),
        "company_name TEXT".to_string(),
    ];
    if schema.has_exchange_column {
        columns.push("exchange TEXT NOT NULL".to_string());
    }
    columns.extend(schema.numeric_columns.iter().map(|c| format!("{c} REAL")));
    columns.extend(schema.tag_columns.iter().map(|c| format!("{c} TEXT")));
    let key = if schema.has_exchange_column {
        "PRIMARY KEY (symbol, exchange)"
    } else {
        "PRIMARY KEY (symbol)"
    };
    columns.push(key.to_string());

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);\n",
        schema.table,
        columns.join(",\n    ")
    )
}

/// SQLite reports unknown columns as "no such column: <name>".
fn query_error(segment: MarketSegment, e: rusqlite::Error) -> ScopeError {
    let message = e.to_string();
    match message.split_once("no such column: ") {
        Some((_, column)) => ScopeError::SchemaGap {
            segment: segment.to_string(),
            column: column.trim().to_string(),
        },
        None => ScopeError::DatabaseQuery { reason: message },
    }
}

/// The SELECT for one ranked selection, plus its positional parameters.
fn ranked_sql(segment: MarketSegment, selection: &RankSelection) -> (String, Vec<Value>) {
    let schema = segment.schema();
    let value = selection.value_column;
    let rank = selection.rank_column.unwrap_or("NULL");
    let extreme = selection.extreme_column.unwrap_or("NULL");

    let mut sql = format!(
        "SELECT symbol, company_name, {value}, {rank}, {extreme} FROM {} WHERE {value} IS NOT NULL",
        schema.table
    );
    let mut values = Vec::new();
    if schema.has_exchange_column {
        values.push(Value::Text(segment.as_str().to_string()));
        sql.push_str(&format!(" AND exchange = ?{}", values.len()));
    }

    let (order_by, window) = match selection.order {
        RankOrder::RankWindow {
            rank_column,
            first,
            last,
        } => {
            values.push(Value::Integer(first as i64));
            sql.push_str(&format!(" AND {rank_column} >= ?{}", values.len()));
            values.push(Value::Integer(last as i64));
            sql.push_str(&format!(" AND {rank_column} <= ?{}", values.len()));
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
            (format!("{value} {direction}"), Some((offset, limit)))
        }
    };

    sql.push_str(&format!(" ORDER BY {order_by}"));
    if let Some((offset, limit)) = window {
        values.push(Value::Integer(limit as i64));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
        values.push(Value::Integer(offset as i64));
        sql.push_str(&format!(" OFFSET ?{}", values.len()));
    }

    (sql, values)
}

fn parse_date(raw: &str) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            raw.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

impl IndicatorPort for SqliteStore {
    fn select_ranked(
        &self,
        segment: MarketSegment,
        selection: &RankSelection,
    ) -> Result<Vec<IndicatorRow>, ScopeError> {
        let conn = self.conn()?;
        let (sql, values) = ranked_sql(segment, selection);

        let mut stmt = conn.prepare(&sql).map_err(|e| query_error(segment, e))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                let stored_rank: Option<f64> = row.get(3)?;
                Ok(IndicatorRow {
                    instrument: row.get(0)?,
                    display_name: row.get(1)?,
                    value: row.get(2)?,
                    stored_rank: stored_rank.and_then(rank_from_f64),
                    extreme: row.get(4)?,
                })
            })
            .map_err(|e| query_error(segment, e))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| query_error(segment, e))?);
        }
        Ok(result)
    }

    fn fetch_record(
        &self,
        segment: MarketSegment,
        instrument: &str,
    ) -> Result<Option<IndicatorRecord>, ScopeError> {
        let schema = segment.schema();
        let conn = self.conn()?;

        let mut columns = vec!["symbol", "company_name"];
        columns.extend(schema.numeric_columns.iter().copied());
        columns.extend(schema.tag_columns.iter().copied());
        let mut sql = format!(
            "SELECT {} FROM {} WHERE symbol = ?1",
            columns.join(", "),
            schema.table
        );
        let mut values = vec![Value::Text(instrument.to_string())];
        if schema.has_exchange_column {
            sql.push_str(" AND exchange = ?2");
            values.push(Value::Text(segment.as_str().to_string()));
        }

        let numeric_start = 2;
        let tag_start = numeric_start + schema.numeric_columns.len();

        conn.query_row(&sql, params_from_iter(values.iter()), |row| {
            let mut record = IndicatorRecord::new(row.get::<_, String>(0)?, segment);
            record.display_name = row.get(1)?;
            for (i, column) in schema.numeric_columns.iter().enumerate() {
                if let Some(v) = row.get::<_, Option<f64>>(numeric_start + i)? {
                    record.numeric.insert(*column, v);
                }
            }
            for (i, column) in schema.tag_columns.iter().enumerate() {
                if let Some(t) = row.get::<_, Option<String>>(tag_start + i)? {
                    record.tags.insert(*column, t);
                }
            }
            Ok(record)
        })
        .optional()
        .map_err(|e| query_error(segment, e))
    }
}

impl BarPort for SqliteStore {
    fn fetch_recent_bars(
        &self,
        instrument: &str,
        segment: MarketSegment,
        count: usize,
    ) -> Result<Vec<Bar>, ScopeError> {
        let conn = self.conn()?;

        let query = "SELECT trading_date, open, high, low, close, volume
                     FROM ohlc_prices
                     WHERE symbol = ?1 AND exchange = ?2
                     ORDER BY trading_date DESC
                     LIMIT ?3";

        let mut stmt = conn
            .prepare(query)
            .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let rows = stmt
            .query_map(params![instrument, segment.as_str(), count as i64], |row| {
                let date_str: String = row.get(0)?;
                Ok(Bar {
                    date: parse_date(&date_str)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })
            .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(
                row.map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
                    reason: e.to_string(),
                })?,
            );
        }
        bars.reverse();

        Ok(bars)
    }
}

impl InstrumentPort for SqliteStore {
    fn fetch_instrument(
        &self,
        instrument: &str,
        segment: MarketSegment,
    ) -> Result<Option<InstrumentInfo>, ScopeError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT ticker, company_name, sector, industry, market_cap, exchange
             FROM symbols
             WHERE ticker = ?1 AND exchange = ?2",
            params![instrument, segment.as_str()],
            |row| {
                let ticker: String = row.get(0)?;
                let company: Option<String> = row.get(1)?;
                Ok(InstrumentInfo {
                    display_name: company.unwrap_or_else(|| ticker.clone()),
                    instrument: ticker,
                    sector: row.get(2)?,
                    industry: row.get(3)?,
                    market_cap: row.get(4)?,
                    exchange: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(|e: rusqlite::Error| ScopeError::DatabaseQuery {
            reason: e.to_string(),
        })
    }
}
