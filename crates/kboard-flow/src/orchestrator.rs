//! Pipeline orchestration and the stage gate.
//!
//! The orchestrator owns the single process-wide in-flight slot: at most
//! one stage's worker runs at any time, which totally orders stage
//! execution and eliminates races on the shared progress counters. It is
//! advisory over the single-flight rule but authoritative over
//! prerequisites — completion is always re-derived from the store via the
//! status evaluator, never taken from client claims.
//!
//! `request_stage` returns as soon as validation passes; the worker runs in
//! a background task and callers poll the progress registry and the status
//! evaluator until convergence.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde_json::json;
use tracing::Instrument;

use kboard_core::observability::stage_span;
use kboard_core::store::MarketStore;

use crate::error::{Error, Result};
use crate::progress::ProgressRegistry;
use crate::stage::CollectionStage;
use crate::status::{StatusEvaluator, Thresholds};
use crate::window::WindowSpec;
use crate::worker::{self, WorkerCommand};

/// Worker commands for the three stages.
#[derive(Debug, Clone)]
pub struct StageWorkers {
    /// Stage 1: market-cap snapshot collector.
    pub market_cap: WorkerCommand,
    /// Stage 2: OHLCV history collector.
    pub ohlcv: WorkerCommand,
    /// Stage 3: Best-K calculator.
    pub best_k: WorkerCommand,
}

impl StageWorkers {
    fn command(&self, stage: CollectionStage) -> &WorkerCommand {
        match stage {
            CollectionStage::MarketCap => &self.market_cap,
            CollectionStage::Ohlcv => &self.ohlcv,
            CollectionStage::BestK => &self.best_k,
        }
    }
}

/// The stage gate and background worker driver.
pub struct Orchestrator {
    evaluator: StatusEvaluator,
    registry: Arc<ProgressRegistry>,
    workers: StageWorkers,
    /// The single in-flight slot. `Some(stage)` while that stage's worker
    /// runs; nothing else may start until it clears.
    running: Mutex<Option<CollectionStage>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("evaluator", &self.evaluator)
            .field("workers", &self.workers)
            .field("running", &self.running_stage())
            .finish()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over the given store, registry, and worker
    /// commands.
    #[must_use]
    pub fn new(
        store: Arc<dyn MarketStore>,
        registry: Arc<ProgressRegistry>,
        workers: StageWorkers,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            evaluator: StatusEvaluator::new(store, thresholds),
            registry,
            workers,
            running: Mutex::new(None),
        }
    }

    /// The stage currently holding the in-flight slot, if any.
    #[must_use]
    pub fn running_stage(&self) -> Option<CollectionStage> {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The status evaluator, shared with the HTTP status surface.
    #[must_use]
    pub fn evaluator(&self) -> &StatusEvaluator {
        &self.evaluator
    }

    /// Requests a stage transition.
    ///
    /// Validation order: in-flight lock, then predecessor status (derived
    /// fresh from the store), then the Best-K window requirement. On
    /// success the stage's tracker is reset and the worker is launched in
    /// the background; the call returns immediately.
    ///
    /// Re-requesting a stage that is already done simply re-runs it —
    /// re-collecting today's data is a valid use case.
    ///
    /// # Errors
    ///
    /// - [`Error::StageLocked`] when any stage is mid-flight
    /// - [`Error::PrerequisiteNotMet`] when the predecessor is incomplete
    /// - [`Error::InvalidWindow`] when Best-K is requested without a window
    /// - storage errors from the prerequisite evaluation
    pub async fn request_stage(
        self: &Arc<Self>,
        stage: CollectionStage,
        window: Option<WindowSpec>,
    ) -> Result<()> {
        // Claim the slot before the async prerequisite check so two
        // concurrent requests cannot both pass validation.
        self.claim_slot(stage)?;

        if let Err(err) = self.validate(stage, window.as_ref()).await {
            self.release_slot();
            return Err(err);
        }

        let command = self.workers.command(stage);
        self.registry.tracker(stage).reset(command.expected_total);

        tracing::info!(stage = %stage, "stage accepted, launching worker");
        let this = Arc::clone(self);
        let span = stage_span("run_stage", stage.as_str());
        tokio::spawn(
            async move {
                this.run_stage(stage, window).await;
            }
            .instrument(span),
        );
        Ok(())
    }

    fn claim_slot(&self, stage: CollectionStage) -> Result<()> {
        let mut slot = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(running) = *slot {
            return Err(Error::StageLocked { running });
        }
        *slot = Some(stage);
        Ok(())
    }

    fn release_slot(&self) {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    async fn validate(&self, stage: CollectionStage, window: Option<&WindowSpec>) -> Result<()> {
        if let Some(missing) = self.unmet_prerequisite(stage).await? {
            return Err(Error::PrerequisiteNotMet { stage, missing });
        }
        if stage == CollectionStage::BestK && window.is_none() {
            return Err(Error::invalid_window("best-k requires a resolved window"));
        }
        Ok(())
    }

    /// Returns the incomplete predecessor of `stage`, if any, re-derived
    /// from the store.
    async fn unmet_prerequisite(&self, stage: CollectionStage) -> Result<Option<CollectionStage>> {
        let Some(predecessor) = stage.predecessor() else {
            return Ok(None);
        };
        let report = self.evaluator.evaluate().await?;
        let done = match predecessor {
            CollectionStage::MarketCap => report.market_cap_done,
            CollectionStage::Ohlcv => report.ohlcv_done,
            CollectionStage::BestK => report.best_k_done,
        };
        Ok(if done { None } else { Some(predecessor) })
    }

    /// Drives one stage's worker to completion and releases the slot.
    async fn run_stage(&self, stage: CollectionStage, window: Option<WindowSpec>) {
        let command = self.workers.command(stage);
        let tracker = self.registry.tracker(stage);
        let payload = window.map(|w| {
            json!({
                "period": w.period.as_str(),
                "startDate": w.start,
                "endDate": w.end,
                "market": w.market,
            })
        });

        let started = Instant::now();
        let result = worker::invoke(command, payload.as_ref(), tracker).await;

        // Lifecycle cleanup happens regardless of outcome; the evaluator
        // re-derives status from the store on the next poll.
        tracker.finish();
        self.release_slot();

        let elapsed_secs = started.elapsed().as_secs();
        match result {
            Ok(report) if report.success => {
                tracing::info!(stage = %stage, elapsed_secs, "stage completed");
            }
            Ok(report) => {
                tracing::warn!(
                    stage = %stage,
                    elapsed_secs,
                    message = report.message.as_deref().unwrap_or(""),
                    "worker reported failure"
                );
            }
            Err(err) => {
                tracing::warn!(stage = %stage, elapsed_secs, error = %err, "stage failed");
            }
        }
    }
}
