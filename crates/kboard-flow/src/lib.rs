//! # kboard-flow
//!
//! Orchestration domain for the kboard collection pipeline.
//!
//! This crate implements the three-stage collection pipeline
//! (`market-cap → ohlcv → best-k`), providing:
//!
//! - **Stage Gate**: A state machine enforcing stage prerequisites and the
//!   single-in-flight rule across the whole pipeline
//! - **Worker Invocation**: Launching external collector processes with
//!   piped stdio and a wall-clock timeout
//! - **Progress Tracking**: Live `[current/total]` progress parsed from
//!   worker output, exposed to concurrent pollers
//! - **Status Evaluation**: Thresholded, always-recomputed completion flags
//!   derived from the persistent store
//! - **Window Resolution**: Symbolic period keys to concrete date ranges
//!
//! ## Guarantees
//!
//! - At most one stage's worker runs at any time, process-wide
//! - Stage completion is always re-derived from the store, never cached
//!   and never taken from client claims
//! - Forced termination (timeout) is a failure outcome, never a clean stop

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod scheduler;
pub mod stage;
pub mod status;
pub mod window;
pub mod worker;

pub use error::{Error, Result};
pub use orchestrator::Orchestrator;
pub use progress::{ProgressRegistry, ProgressSnapshot, ProgressTracker};
pub use stage::CollectionStage;
pub use status::{StatusEvaluator, StatusReport, Thresholds};
pub use window::{PeriodKey, WindowSpec};
