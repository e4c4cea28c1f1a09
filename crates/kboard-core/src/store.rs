//! Persistent-store read contract for the collection pipeline.
//!
//! The pipeline never writes collected data itself — the external worker
//! processes own all writes. This module defines the minimal read surface
//! the pipeline needs to derive stage status and serve the latest snapshot:
//! aggregate dates and counts over three tables (`daily_market_cap`,
//! `daily_stock_data`, `best_k_analysis`).
//!
//! Two implementations are provided:
//!
//! - [`pg::PgStore`]: Postgres via sqlx (production)
//! - [`MemoryStore`]: seedable in-memory store (tests and debug mode)

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;

pub mod pg;

/// Aggregate view of the market-cap table: the latest date of record and
/// the number of rows carrying that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketCapSummary {
    /// Latest `date` value present in `daily_market_cap`.
    pub date: NaiveDate,
    /// Row count at that date.
    pub rows: u64,
}

/// Aggregate view of the OHLCV table: the latest date of record and the
/// distinct-symbol coverage at that date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OhlcvSummary {
    /// Latest `date` value present in `daily_stock_data`.
    pub date: NaiveDate,
    /// Distinct tickers with a row at that date.
    pub symbols: u64,
}

/// One row of the latest market-cap snapshot, served by `/market-latest`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshotRow {
    /// Exchange ticker.
    pub ticker: String,
    /// Company name.
    pub name: String,
    /// Listing market (e.g. KOSPI, KOSDAQ).
    pub market: String,
    /// Market capitalization in KRW.
    pub market_cap: i64,
    /// Closing price.
    pub close_price: f64,
    /// Date of record.
    pub date: NaiveDate,
}

/// Read contract against the persistent market-data store.
///
/// All methods are pure reads and must tolerate a completely empty store
/// without error. Results are never cached by implementations — the status
/// evaluator relies on every call reflecting ground truth.
#[async_trait]
pub trait MarketStore: Send + Sync + 'static {
    /// Latest market-cap date and its row count.
    ///
    /// Returns `None` when the table is empty.
    async fn market_cap_summary(&self) -> Result<Option<MarketCapSummary>>;

    /// Latest OHLCV date and its distinct-symbol count.
    ///
    /// Returns `None` when the table is empty.
    async fn ohlcv_summary(&self) -> Result<Option<OhlcvSummary>>;

    /// Number of distinct symbols with a Best-K result for the given
    /// analysis date. Zero when none exist.
    async fn best_k_symbol_count(&self, analysis_date: NaiveDate) -> Result<u64>;

    /// All market-cap rows at the latest date, ordered by market cap
    /// descending. Empty when the table is empty.
    async fn latest_market_snapshot(&self) -> Result<Vec<MarketSnapshotRow>>;
}

/// In-memory market store for testing and debug mode.
///
/// Thread-safe via `RwLock`. Seed it with rows, then query through the
/// [`MarketStore`] trait exactly as against Postgres.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    market_cap: Vec<MarketSnapshotRow>,
    /// (ticker, date) pairs standing in for OHLCV rows.
    ohlcv: Vec<(String, NaiveDate)>,
    /// (ticker, analysis date) pairs standing in for Best-K results.
    best_k: Vec<(String, NaiveDate)>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts one market-cap row.
    pub fn insert_market_cap(&self, row: MarketSnapshotRow) {
        self.write().market_cap.push(row);
    }

    /// Inserts `count` synthetic market-cap rows dated `date`.
    ///
    /// Tickers are generated (`S0001`, `S0002`, ...); useful for seeding
    /// threshold scenarios without hand-writing rows.
    pub fn seed_market_cap(&self, date: NaiveDate, count: usize) {
        let mut inner = self.write();
        for i in 1..=count {
            inner.market_cap.push(MarketSnapshotRow {
                ticker: format!("S{i:04}"),
                name: format!("Stock {i}"),
                market: if i % 2 == 0 { "KOSDAQ" } else { "KOSPI" }.to_string(),
                market_cap: (1_000_000 * (count - i + 1)) as i64,
                close_price: 10_000.0,
                date,
            });
        }
    }

    /// Inserts one OHLCV observation for `ticker` at `date`.
    pub fn insert_ohlcv(&self, ticker: impl Into<String>, date: NaiveDate) {
        self.write().ohlcv.push((ticker.into(), date));
    }

    /// Inserts `count` synthetic OHLCV observations dated `date`, covering
    /// the same generated tickers as [`MemoryStore::seed_market_cap`].
    pub fn seed_ohlcv(&self, date: NaiveDate, count: usize) {
        let mut inner = self.write();
        for i in 1..=count {
            inner.ohlcv.push((format!("S{i:04}"), date));
        }
    }

    /// Inserts one Best-K result for `ticker` at `analysis_date`.
    pub fn insert_best_k(&self, ticker: impl Into<String>, analysis_date: NaiveDate) {
        self.write().best_k.push((ticker.into(), analysis_date));
    }

    /// Inserts `count` synthetic Best-K results dated `analysis_date`.
    pub fn seed_best_k(&self, analysis_date: NaiveDate, count: usize) {
        let mut inner = self.write();
        for i in 1..=count {
            inner.best_k.push((format!("S{i:04}"), analysis_date));
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn market_cap_summary(&self) -> Result<Option<MarketCapSummary>> {
        let inner = self.read();
        let Some(latest) = inner.market_cap.iter().map(|r| r.date).max() else {
            return Ok(None);
        };
        let rows = inner
            .market_cap
            .iter()
            .filter(|r| r.date == latest)
            .count() as u64;
        Ok(Some(MarketCapSummary { date: latest, rows }))
    }

    async fn ohlcv_summary(&self) -> Result<Option<OhlcvSummary>> {
        let inner = self.read();
        let Some(latest) = inner.ohlcv.iter().map(|(_, d)| *d).max() else {
            return Ok(None);
        };
        let symbols = inner
            .ohlcv
            .iter()
            .filter(|(_, d)| *d == latest)
            .map(|(t, _)| t.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;
        Ok(Some(OhlcvSummary {
            date: latest,
            symbols,
        }))
    }

    async fn best_k_symbol_count(&self, analysis_date: NaiveDate) -> Result<u64> {
        let inner = self.read();
        let symbols = inner
            .best_k
            .iter()
            .filter(|(_, d)| *d == analysis_date)
            .map(|(t, _)| t.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;
        Ok(symbols)
    }

    async fn latest_market_snapshot(&self) -> Result<Vec<MarketSnapshotRow>> {
        let inner = self.read();
        let Some(latest) = inner.market_cap.iter().map(|r| r.date).max() else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<MarketSnapshotRow> = inner
            .market_cap
            .iter()
            .filter(|r| r.date == latest)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.market_cap.cmp(&a.market_cap));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid date literal")
    }

    #[tokio::test]
    async fn empty_store_returns_none_and_empty() {
        let store = MemoryStore::new();
        assert!(store.market_cap_summary().await.unwrap().is_none());
        assert!(store.ohlcv_summary().await.unwrap().is_none());
        assert_eq!(
            store.best_k_symbol_count(date("2024-01-02")).await.unwrap(),
            0
        );
        assert!(store.latest_market_snapshot().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summaries_count_only_the_latest_date() {
        let store = MemoryStore::new();
        store.seed_market_cap(date("2024-01-01"), 10);
        store.seed_market_cap(date("2024-01-02"), 60);

        let summary = store.market_cap_summary().await.unwrap().unwrap();
        assert_eq!(summary.date, date("2024-01-02"));
        assert_eq!(summary.rows, 60);
    }

    #[tokio::test]
    async fn ohlcv_summary_deduplicates_symbols() {
        let store = MemoryStore::new();
        let d = date("2024-01-02");
        store.insert_ohlcv("S0001", d);
        store.insert_ohlcv("S0001", d);
        store.insert_ohlcv("S0002", d);

        let summary = store.ohlcv_summary().await.unwrap().unwrap();
        assert_eq!(summary.symbols, 2);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_by_market_cap_descending() {
        let store = MemoryStore::new();
        store.seed_market_cap(date("2024-01-02"), 5);

        let rows = store.latest_market_snapshot().await.unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].market_cap >= w[1].market_cap));
    }
}
