//! Derived stage-completion status.
//!
//! Stage status is never stored or cached: every call recomputes the three
//! completion flags from the persistent store, so a stage completing needs
//! no invalidation signal and in-memory belief can never diverge from
//! ground truth.
//!
//! Completion is thresholded rather than exact. Upstream collection is
//! flaky — a handful of symbols failing to fetch must not block the
//! pipeline indefinitely — so each stage counts as done once coverage
//! clears a configurable fraction plus an absolute floor.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;

use kboard_core::clock::today_kst;
use kboard_core::store::MarketStore;

use crate::error::Result;

/// Completion thresholds for the status evaluator.
///
/// The defaults are tuned to prevent false-positive "done" signals on small
/// datasets: 50 market-cap rows minimum, 50% OHLCV symbol coverage with an
/// absolute floor of 25 symbols, 30% Best-K coverage with a floor of 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Minimum market-cap rows at the latest date for stage 1 to count as
    /// done.
    pub min_market_cap_rows: u64,
    /// OHLCV distinct-symbol coverage as an integer percentage of the
    /// market-cap row count.
    pub ohlcv_coverage_pct: u64,
    /// Absolute floor on OHLCV distinct symbols.
    pub min_ohlcv_symbols: u64,
    /// Best-K symbol coverage as an integer percentage of the market-cap
    /// row count.
    pub best_k_coverage_pct: u64,
    /// Absolute floor on Best-K symbols.
    pub min_best_k_symbols: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            min_market_cap_rows: 50,
            ohlcv_coverage_pct: 50,
            min_ohlcv_symbols: 25,
            best_k_coverage_pct: 30,
            min_best_k_symbols: 10,
        }
    }
}

/// Row/symbol counts backing the completion flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    /// Market-cap rows at the latest date.
    pub market_cap_rows: u64,
    /// Distinct OHLCV symbols at the latest OHLCV date.
    pub ohlcv_symbols: u64,
    /// Distinct symbols with a Best-K result for today.
    pub best_k_symbols: u64,
}

/// Derived completion state for all three stages.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Stage 1 complete: latest market-cap date is today and row count
    /// clears the minimum.
    pub market_cap_done: bool,
    /// Stage 2 complete: stage 1 done, OHLCV date matches the market-cap
    /// date, and symbol coverage clears the threshold.
    pub ohlcv_done: bool,
    /// Stage 3 complete: stage 2 done and Best-K coverage for today clears
    /// the threshold.
    pub best_k_done: bool,
    /// Latest market-cap date of record, if any.
    pub market_cap_date: Option<NaiveDate>,
    /// Latest OHLCV date of record, if any.
    pub ohlcv_date: Option<NaiveDate>,
    /// The counts the flags were derived from.
    pub counts: StatusCounts,
}

/// Stateless evaluator deriving [`StatusReport`] from the store.
///
/// Safe for unsynchronized concurrent use; holds no mutable state.
#[derive(Clone)]
pub struct StatusEvaluator {
    store: Arc<dyn MarketStore>,
    thresholds: Thresholds,
}

impl std::fmt::Debug for StatusEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusEvaluator")
            .field("store", &"<MarketStore>")
            .field("thresholds", &self.thresholds)
            .finish()
    }
}

impl StatusEvaluator {
    /// Creates an evaluator over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MarketStore>, thresholds: Thresholds) -> Self {
        Self { store, thresholds }
    }

    /// Evaluates against the canonical KST "today".
    ///
    /// # Errors
    ///
    /// Returns a storage error if any store read fails; progress state is
    /// untouched either way.
    pub async fn evaluate(&self) -> Result<StatusReport> {
        self.evaluate_on(today_kst()).await
    }

    /// Evaluates against an explicit reference day. Empty tables yield
    /// all-false flags and `None` dates, never an error.
    ///
    /// # Errors
    ///
    /// Returns a storage error if any store read fails.
    pub async fn evaluate_on(&self, today: NaiveDate) -> Result<StatusReport> {
        let t = self.thresholds;

        let market_cap = self.store.market_cap_summary().await?;
        let (market_cap_date, market_cap_rows) =
            market_cap.map_or((None, 0), |s| (Some(s.date), s.rows));
        let market_cap_done =
            market_cap_date == Some(today) && market_cap_rows >= t.min_market_cap_rows;

        let ohlcv = self.store.ohlcv_summary().await?;
        let (ohlcv_date, ohlcv_symbols) = ohlcv.map_or((None, 0), |s| (Some(s.date), s.symbols));
        let ohlcv_done = market_cap_done
            && ohlcv_date == market_cap_date
            && ohlcv_symbols * 100 >= market_cap_rows * t.ohlcv_coverage_pct
            && ohlcv_symbols >= t.min_ohlcv_symbols;

        let best_k_symbols = self.store.best_k_symbol_count(today).await?;
        let best_k_done = ohlcv_done
            && best_k_symbols * 100 >= market_cap_rows * t.best_k_coverage_pct
            && best_k_symbols >= t.min_best_k_symbols;

        Ok(StatusReport {
            market_cap_done,
            ohlcv_done,
            best_k_done,
            market_cap_date,
            ohlcv_date,
            counts: StatusCounts {
                market_cap_rows,
                ohlcv_symbols,
                best_k_symbols,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kboard_core::store::MemoryStore;

    fn date(s: &str) -> NaiveDate {
        s.parse().expect("valid date literal")
    }

    fn evaluator(store: Arc<MemoryStore>) -> StatusEvaluator {
        StatusEvaluator::new(store, Thresholds::default())
    }

    #[tokio::test]
    async fn empty_store_is_all_pending() {
        let report = evaluator(Arc::new(MemoryStore::new()))
            .evaluate_on(date("2024-06-14"))
            .await
            .unwrap();

        assert!(!report.market_cap_done);
        assert!(!report.ohlcv_done);
        assert!(!report.best_k_done);
        assert_eq!(report.market_cap_date, None);
        assert_eq!(report.ohlcv_date, None);
        assert_eq!(report.counts, StatusCounts::default());
    }

    #[tokio::test]
    async fn market_cap_needs_today_and_minimum_rows() {
        let today = date("2024-06-14");
        let store = Arc::new(MemoryStore::new());

        // Fresh but too few rows.
        store.seed_market_cap(today, 49);
        let report = evaluator(store.clone()).evaluate_on(today).await.unwrap();
        assert!(!report.market_cap_done);

        // Enough rows, but stale date.
        let store = Arc::new(MemoryStore::new());
        store.seed_market_cap(date("2024-06-13"), 60);
        let report = evaluator(store.clone()).evaluate_on(today).await.unwrap();
        assert!(!report.market_cap_done);
        assert_eq!(report.market_cap_date, Some(date("2024-06-13")));

        // Fresh and sufficient.
        let store = Arc::new(MemoryStore::new());
        store.seed_market_cap(today, 60);
        let report = evaluator(store).evaluate_on(today).await.unwrap();
        assert!(report.market_cap_done);
        assert!(!report.ohlcv_done);
    }

    #[tokio::test]
    async fn ohlcv_needs_matching_date_and_coverage() {
        let today = date("2024-06-14");
        let store = Arc::new(MemoryStore::new());
        store.seed_market_cap(today, 60);

        // 29/60 symbols < 50% coverage.
        store.seed_ohlcv(today, 29);
        let report = evaluator(store.clone()).evaluate_on(today).await.unwrap();
        assert!(!report.ohlcv_done);

        // 31/60 clears 50% and the absolute floor of 25.
        store.seed_ohlcv(today, 31);
        let report = evaluator(store.clone()).evaluate_on(today).await.unwrap();
        assert!(report.ohlcv_done);
        assert!(!report.best_k_done);
    }

    #[tokio::test]
    async fn ohlcv_on_stale_date_does_not_count() {
        let today = date("2024-06-14");
        let store = Arc::new(MemoryStore::new());
        store.seed_market_cap(today, 60);
        store.seed_ohlcv(date("2024-06-13"), 60);

        let report = evaluator(store).evaluate_on(today).await.unwrap();
        assert!(report.market_cap_done);
        assert!(!report.ohlcv_done);
    }

    #[tokio::test]
    async fn best_k_needs_coverage_and_floor() {
        let today = date("2024-06-14");
        let store = Arc::new(MemoryStore::new());
        store.seed_market_cap(today, 60);
        store.seed_ohlcv(today, 60);

        // 17/60 < 30%.
        store.seed_best_k(today, 17);
        let report = evaluator(store.clone()).evaluate_on(today).await.unwrap();
        assert!(!report.best_k_done);

        // 19/60 clears 30% (18) and the floor of 10.
        store.seed_best_k(today, 19);
        let report = evaluator(store).evaluate_on(today).await.unwrap();
        assert!(report.best_k_done);
    }

    #[tokio::test]
    async fn absolute_floor_blocks_tiny_datasets() {
        let today = date("2024-06-14");
        let thresholds = Thresholds {
            min_market_cap_rows: 5,
            ..Thresholds::default()
        };
        let store = Arc::new(MemoryStore::new());
        // 8 rows with full OHLCV coverage: 100% > 50%, but 8 < the 25-symbol floor.
        store.seed_market_cap(today, 8);
        store.seed_ohlcv(today, 8);

        let report = StatusEvaluator::new(store, thresholds)
            .evaluate_on(today)
            .await
            .unwrap();
        assert!(report.market_cap_done);
        assert!(!report.ohlcv_done);
    }
}
