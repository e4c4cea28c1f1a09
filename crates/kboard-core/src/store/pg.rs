//! Postgres implementation of the market-store read contract.
//!
//! The external collector workers own the schema and all writes; this
//! module only reads aggregates. Queries mirror the workers' own latest-date
//! lookups (`WHERE date = (SELECT MAX(date) ...)`).

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use crate::store::{MarketCapSummary, MarketSnapshotRow, MarketStore, OhlcvSummary};

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::storage_with_source("database operation failed", e)
    }
}

/// Postgres-backed market store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at `url` with a small pool.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` if the connection cannot be established.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| Error::storage_with_source("database connection failed", e))?;
        Ok(Self { pool })
    }
}

fn count_column(row: &PgRow, column: &str) -> Result<u64> {
    let count: i64 = row.try_get(column)?;
    Ok(count.max(0) as u64)
}

#[async_trait]
impl MarketStore for PgStore {
    async fn market_cap_summary(&self) -> Result<Option<MarketCapSummary>> {
        let row = sqlx::query(
            "SELECT date, COUNT(*) AS rows \
             FROM daily_market_cap \
             WHERE date = (SELECT MAX(date) FROM daily_market_cap) \
             GROUP BY date",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(MarketCapSummary {
                date: r.try_get("date")?,
                rows: count_column(&r, "rows")?,
            })
        })
        .transpose()
    }

    async fn ohlcv_summary(&self) -> Result<Option<OhlcvSummary>> {
        let row = sqlx::query(
            "SELECT date, COUNT(DISTINCT ticker) AS symbols \
             FROM daily_stock_data \
             WHERE date = (SELECT MAX(date) FROM daily_stock_data) \
             GROUP BY date",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(OhlcvSummary {
                date: r.try_get("date")?,
                symbols: count_column(&r, "symbols")?,
            })
        })
        .transpose()
    }

    async fn best_k_symbol_count(&self, analysis_date: NaiveDate) -> Result<u64> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT ticker) AS symbols \
             FROM best_k_analysis \
             WHERE analysis_date = $1",
        )
        .bind(analysis_date)
        .fetch_one(&self.pool)
        .await?;

        count_column(&row, "symbols")
    }

    async fn latest_market_snapshot(&self) -> Result<Vec<MarketSnapshotRow>> {
        let rows = sqlx::query(
            "SELECT ticker, name, market, market_cap, close_price, date \
             FROM daily_market_cap \
             WHERE date = (SELECT MAX(date) FROM daily_market_cap) \
             ORDER BY market_cap DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(MarketSnapshotRow {
                    ticker: r.try_get("ticker")?,
                    name: r.try_get("name")?,
                    market: r.try_get("market")?,
                    market_cap: r.try_get("market_cap")?,
                    close_price: r.try_get("close_price")?,
                    date: r.try_get("date")?,
                })
            })
            .collect()
    }
}
