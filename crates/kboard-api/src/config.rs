//! Server configuration.
//!
//! Loaded from `KBOARD_*` environment variables with local-dev defaults.
//! The worker scripts are external programs owned by the collection side;
//! this config only locates them and bounds their runtime.

use std::time::Duration;

use kboard_core::{Error, Result};
use kboard_flow::orchestrator::StageWorkers;
use kboard_flow::scheduler::DailySchedule;
use kboard_flow::worker::WorkerCommand;
use kboard_flow::Thresholds;

/// CORS configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    /// Allowed origins; empty means allow any (debug posture).
    pub allowed_origins: Vec<String>,
    /// Preflight cache lifetime in seconds.
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            max_age_seconds: 3600,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Debug posture: pretty logs, in-memory store allowed.
    pub debug: bool,
    /// Postgres connection URL; required unless `debug`.
    pub database_url: Option<String>,
    /// Interpreter for the worker scripts.
    pub worker_program: String,
    /// Stage 1 script path.
    pub market_cap_script: String,
    /// Stage 2 script path.
    pub ohlcv_script: String,
    /// Stage 3 script path.
    pub best_k_script: String,
    /// Wall-clock timeout for the collector stages, in seconds.
    pub collect_timeout_secs: u64,
    /// Wall-clock timeout for the Best-K stage, in seconds.
    pub best_k_timeout_secs: u64,
    /// Expected symbol universe size, seeds the progress totals.
    pub expected_symbols: u64,
    /// Completion thresholds for the status evaluator.
    pub thresholds: Thresholds,
    /// CORS settings.
    pub cors: CorsConfig,
    /// Market filters offered by `/best-k-periods`.
    pub markets: Vec<String>,
    /// Optional daily collection tick (KST `HH:MM`).
    pub daily_collect: Option<DailySchedule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            debug: true,
            database_url: None,
            worker_program: "python3".to_string(),
            market_cap_script: "workers/collector_market_cap.py".to_string(),
            ohlcv_script: "workers/collector.py".to_string(),
            best_k_script: "workers/best_k_calculator.py".to_string(),
            collect_timeout_secs: 600,
            best_k_timeout_secs: 600,
            expected_symbols: 200,
            thresholds: Thresholds::default(),
            cors: CorsConfig::default(),
            markets: vec!["KOSPI".to_string(), "KOSDAQ".to_string()],
            daily_collect: None,
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for unparseable numeric or schedule
    /// values.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("KBOARD_HOST") {
            config.host = host;
        }
        if let Some(port) = parse_env("KBOARD_PORT")? {
            config.port = port;
        }
        if let Ok(debug) = std::env::var("KBOARD_DEBUG") {
            config.debug = matches!(debug.as_str(), "1" | "true" | "yes");
        }
        config.database_url = std::env::var("DATABASE_URL").ok();

        if let Ok(program) = std::env::var("KBOARD_WORKER_PROGRAM") {
            config.worker_program = program;
        }
        if let Ok(path) = std::env::var("KBOARD_MARKET_CAP_SCRIPT") {
            config.market_cap_script = path;
        }
        if let Ok(path) = std::env::var("KBOARD_OHLCV_SCRIPT") {
            config.ohlcv_script = path;
        }
        if let Ok(path) = std::env::var("KBOARD_BEST_K_SCRIPT") {
            config.best_k_script = path;
        }
        if let Some(secs) = parse_env("KBOARD_COLLECT_TIMEOUT_SECS")? {
            config.collect_timeout_secs = secs;
        }
        if let Some(secs) = parse_env("KBOARD_BEST_K_TIMEOUT_SECS")? {
            config.best_k_timeout_secs = secs;
        }
        if let Some(n) = parse_env("KBOARD_EXPECTED_SYMBOLS")? {
            config.expected_symbols = n;
        }

        if let Some(n) = parse_env("KBOARD_MIN_MARKET_CAP_ROWS")? {
            config.thresholds.min_market_cap_rows = n;
        }
        if let Some(n) = parse_env("KBOARD_OHLCV_COVERAGE_PCT")? {
            config.thresholds.ohlcv_coverage_pct = n;
        }
        if let Some(n) = parse_env("KBOARD_MIN_OHLCV_SYMBOLS")? {
            config.thresholds.min_ohlcv_symbols = n;
        }
        if let Some(n) = parse_env("KBOARD_BEST_K_COVERAGE_PCT")? {
            config.thresholds.best_k_coverage_pct = n;
        }
        if let Some(n) = parse_env("KBOARD_MIN_BEST_K_SYMBOLS")? {
            config.thresholds.min_best_k_symbols = n;
        }

        if let Ok(origins) = std::env::var("KBOARD_CORS_ORIGINS") {
            config.cors.allowed_origins = split_csv(&origins);
        }
        if let Ok(markets) = std::env::var("KBOARD_MARKETS") {
            config.markets = split_csv(&markets);
        }
        if let Ok(tick) = std::env::var("KBOARD_DAILY_COLLECT") {
            let schedule = DailySchedule::parse(&tick).ok_or_else(|| {
                Error::invalid_input(format!("KBOARD_DAILY_COLLECT must be HH:MM, got {tick:?}"))
            })?;
            config.daily_collect = Some(schedule);
        }

        Ok(config)
    }

    /// Builds the per-stage worker commands from this configuration.
    #[must_use]
    pub fn stage_workers(&self) -> StageWorkers {
        let collect_timeout = Duration::from_secs(self.collect_timeout_secs);
        StageWorkers {
            market_cap: WorkerCommand::new(
                &self.worker_program,
                &self.market_cap_script,
                "market-cap",
            )
            .with_timeout(collect_timeout)
            .with_expected_total(self.expected_symbols),
            ohlcv: WorkerCommand::new(&self.worker_program, &self.ohlcv_script, "ohlcv")
                .with_timeout(collect_timeout)
                .with_expected_total(self.expected_symbols),
            best_k: WorkerCommand::new(&self.worker_program, &self.best_k_script, "best-k")
                .with_timeout(Duration::from_secs(self.best_k_timeout_secs))
                .with_expected_total(self.expected_symbols),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_input(format!("{name} has invalid value {value:?}"))),
        Err(_) => Ok(None),
    }
}

fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}
