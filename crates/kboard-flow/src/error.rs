//! Error types for the pipeline domain.

use crate::stage::CollectionStage;

/// The result type used throughout kboard-flow.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Another stage is currently mid-flight.
    #[error("stage {running} is already running; wait for it to finish")]
    StageLocked {
        /// The stage currently holding the in-flight slot.
        running: CollectionStage,
    },

    /// The requested stage's predecessor is not complete.
    #[error("cannot start {stage}: {missing} has not completed")]
    PrerequisiteNotMet {
        /// The stage that was requested.
        stage: CollectionStage,
        /// The incomplete predecessor.
        missing: CollectionStage,
    },

    /// The period key is not one of the known symbolic keys.
    #[error("unknown period key: {key}")]
    UnknownPeriod {
        /// The key as supplied by the caller.
        key: String,
    },

    /// A custom window was requested without both bounds.
    #[error("custom period requires both startDate and endDate")]
    MissingBounds,

    /// The resolved window is invalid.
    #[error("invalid window: {message}")]
    InvalidWindow {
        /// Description of the violation.
        message: String,
    },

    /// The worker process could not be started.
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        /// Worker name.
        worker: String,
        /// The underlying spawn failure.
        #[source]
        source: std::io::Error,
    },

    /// The worker process exited with a non-zero status.
    #[error("worker {worker} exited with {code:?}")]
    WorkerExit {
        /// Worker name.
        worker: String,
        /// Exit code, `None` when killed by a signal.
        code: Option<i32>,
        /// Bounded excerpt of the worker's stderr.
        stderr: String,
    },

    /// The worker exceeded its wall-clock timeout and was killed.
    #[error("worker {worker} timed out after {seconds}s")]
    Timeout {
        /// Worker name.
        worker: String,
        /// The timeout that was exceeded.
        seconds: u64,
    },

    /// The worker exited cleanly but its stdout was not the expected JSON
    /// report. Distinct from exit-code failure.
    #[error("worker {worker} produced malformed output: {message}")]
    MalformedOutput {
        /// Worker name.
        worker: String,
        /// Description of the parse failure.
        message: String,
    },

    /// An error from kboard-core (storage, serialization).
    #[error(transparent)]
    Core(#[from] kboard_core::Error),
}

impl Error {
    /// Creates a new invalid-window error.
    #[must_use]
    pub fn invalid_window(message: impl Into<String>) -> Self {
        Self::InvalidWindow {
            message: message.into(),
        }
    }

    /// Creates a new unknown-period error.
    #[must_use]
    pub fn unknown_period(key: impl Into<String>) -> Self {
        Self::UnknownPeriod { key: key.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_stage() {
        let err = Error::PrerequisiteNotMet {
            stage: CollectionStage::Ohlcv,
            missing: CollectionStage::MarketCap,
        };
        assert_eq!(
            err.to_string(),
            "cannot start ohlcv: market-cap has not completed"
        );
    }

    #[test]
    fn worker_exit_reports_code() {
        let err = Error::WorkerExit {
            worker: "best-k".to_string(),
            code: Some(137),
            stderr: String::new(),
        };
        assert!(err.to_string().contains("137"));
    }
}
