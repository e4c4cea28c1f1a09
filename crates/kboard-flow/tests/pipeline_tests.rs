//! Pipeline integration tests.
//!
//! Drives the orchestrator end-to-end against the in-memory store with
//! stub shell workers standing in for the Python collectors.

use std::sync::Arc;
use std::time::Duration;

use kboard_core::clock::today_kst;
use kboard_core::store::MemoryStore;
use kboard_flow::orchestrator::StageWorkers;
use kboard_flow::worker::WorkerCommand;
use kboard_flow::{
    CollectionStage, Error, Orchestrator, PeriodKey, ProgressRegistry, Thresholds, window,
};

fn stub(script: &str) -> WorkerCommand {
    WorkerCommand {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        label: "stub".to_string(),
        timeout: Duration::from_secs(10),
        expected_total: 200,
    }
}

fn ok_worker() -> WorkerCommand {
    stub(r#"echo '{"success": true}'"#)
}

fn orchestrator_with(
    store: Arc<MemoryStore>,
    workers: StageWorkers,
) -> (Arc<Orchestrator>, Arc<ProgressRegistry>) {
    let registry = Arc::new(ProgressRegistry::new());
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        Arc::clone(&registry),
        workers,
        Thresholds::default(),
    ));
    (orchestrator, registry)
}

fn all_ok(store: Arc<MemoryStore>) -> (Arc<Orchestrator>, Arc<ProgressRegistry>) {
    orchestrator_with(
        store,
        StageWorkers {
            market_cap: ok_worker(),
            ohlcv: ok_worker(),
            best_k: ok_worker(),
        },
    )
}

async fn wait_until_idle(orchestrator: &Orchestrator) {
    for _ in 0..200 {
        if orchestrator.running_stage().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("orchestrator never went idle");
}

#[tokio::test]
async fn market_cap_runs_without_prerequisites() {
    let (orchestrator, registry) = all_ok(Arc::new(MemoryStore::new()));

    orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .expect("stage 1 has no prerequisite");

    wait_until_idle(&orchestrator).await;
    assert!(!registry.collect().snapshot().is_running);
}

#[tokio::test]
async fn ohlcv_refused_until_market_cap_done() {
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, _) = all_ok(Arc::clone(&store));

    let err = orchestrator
        .request_stage(CollectionStage::Ohlcv, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PrerequisiteNotMet {
            stage: CollectionStage::Ohlcv,
            missing: CollectionStage::MarketCap,
        }
    ));
    // Validation failure releases the slot.
    assert_eq!(orchestrator.running_stage(), None);

    // Seed 60 fresh rows; the same request now passes the gate.
    store.seed_market_cap(today_kst(), 60);
    orchestrator
        .request_stage(CollectionStage::Ohlcv, None)
        .await
        .expect("prerequisite satisfied after seeding");
    wait_until_idle(&orchestrator).await;
}

#[tokio::test]
async fn second_request_fails_while_first_is_running() {
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, _) = orchestrator_with(
        Arc::clone(&store),
        StageWorkers {
            market_cap: stub(r#"sleep 2; echo '{"success": true}'"#),
            ohlcv: ok_worker(),
            best_k: ok_worker(),
        },
    );

    orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .expect("first request accepted");

    let err = orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StageLocked {
            running: CollectionStage::MarketCap
        }
    ));

    wait_until_idle(&orchestrator).await;
}

#[tokio::test]
async fn best_k_requires_window_and_full_prerequisites() {
    let store = Arc::new(MemoryStore::new());
    let today = today_kst();
    store.seed_market_cap(today, 60);
    store.seed_ohlcv(today, 60);
    let (orchestrator, _) = all_ok(Arc::clone(&store));

    let spec = window::resolve(PeriodKey::Week1, None, None, None, today).unwrap();
    orchestrator
        .request_stage(CollectionStage::BestK, Some(spec))
        .await
        .expect("ohlcv done, best-k may run");
    wait_until_idle(&orchestrator).await;

    let err = orchestrator
        .request_stage(CollectionStage::BestK, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWindow { .. }));
    assert_eq!(orchestrator.running_stage(), None);
}

#[tokio::test]
async fn worker_progress_is_visible_to_pollers() {
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, registry) = orchestrator_with(
        Arc::clone(&store),
        StageWorkers {
            market_cap: stub(
                r#"echo '[10/200] a' >&2; echo '[200/200] b' >&2; echo '{"success": true}'"#,
            ),
            ohlcv: ok_worker(),
            best_k: ok_worker(),
        },
    );

    orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .unwrap();
    wait_until_idle(&orchestrator).await;

    let snap = registry.collect().snapshot();
    assert_eq!(snap.current, 200);
    assert_eq!(snap.total, 200);
    assert_eq!(snap.percent, 100);
    assert!(!snap.is_running);
}

#[tokio::test]
async fn killed_worker_reverts_stage_and_clears_running() {
    let store = Arc::new(MemoryStore::new());
    let (orchestrator, registry) = orchestrator_with(
        Arc::clone(&store),
        StageWorkers {
            market_cap: stub("exit 137"),
            ohlcv: ok_worker(),
            best_k: ok_worker(),
        },
    );

    orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .expect("accepted before the worker fails");
    wait_until_idle(&orchestrator).await;

    assert!(!registry.collect().snapshot().is_running);
    // Nothing was collected, so the evaluator still derives Pending.
    let report = orchestrator.evaluator().evaluate().await.unwrap();
    assert!(!report.market_cap_done);
    // The pipeline is free for a retry.
    orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .expect("slot released after failure");
    wait_until_idle(&orchestrator).await;
}

#[tokio::test]
async fn re_running_a_done_stage_is_allowed() {
    let store = Arc::new(MemoryStore::new());
    store.seed_market_cap(today_kst(), 60);
    let (orchestrator, _) = all_ok(Arc::clone(&store));

    let report = orchestrator.evaluator().evaluate().await.unwrap();
    assert!(report.market_cap_done);

    orchestrator
        .request_stage(CollectionStage::MarketCap, None)
        .await
        .expect("re-collection of a done stage is valid");
    wait_until_idle(&orchestrator).await;
}

#[tokio::test]
async fn end_to_end_status_convergence() {
    // Seeded store walks through the thresholds one stage at a time:
    // market-cap fresh, no OHLCV yet.
    let store = Arc::new(MemoryStore::new());
    let today = today_kst();
    store.seed_market_cap(today, 60);

    let (orchestrator, _) = all_ok(Arc::clone(&store));
    let report = orchestrator.evaluator().evaluate().await.unwrap();
    assert!(report.market_cap_done);
    assert!(!report.ohlcv_done);

    let err = orchestrator
        .request_stage(CollectionStage::BestK, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::PrerequisiteNotMet {
            missing: CollectionStage::Ohlcv,
            ..
        }
    ));

    // The worker (out of this core's control) writes the OHLCV rows; the
    // evaluator picks them up with no invalidation signal.
    store.seed_ohlcv(today, 40);
    let report = orchestrator.evaluator().evaluate().await.unwrap();
    assert!(report.ohlcv_done);
}
