//! Collection stage endpoints (stages 1 and 2).
//!
//! ```text
//! POST /collect-market-cap - Launch the market-cap collector
//! POST /collect-ohlcv      - Launch the OHLCV collector
//! GET  /collect-progress   - Shared live progress for both collectors
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use kboard_flow::{CollectionStage, ProgressSnapshot};

use crate::error::ApiResult;
use crate::server::AppState;

/// Acknowledgement returned when a stage launch is accepted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    /// Always true.
    pub success: bool,
    /// Human-readable acknowledgement.
    pub message: String,
}

/// Builds the collection routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/collect-market-cap", post(collect_market_cap))
        .route("/collect-ohlcv", post(collect_ohlcv))
        .route("/collect-progress", get(collect_progress))
}

async fn launch(
    state: &AppState,
    stage: CollectionStage,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    state.orchestrator().request_stage(stage, None).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            success: true,
            message: format!("{stage} collection started"),
        }),
    ))
}

/// `POST /collect-market-cap`
///
/// Stage 1 has no prerequisites; refuses only while another stage runs.
async fn collect_market_cap(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    launch(&state, CollectionStage::MarketCap).await
}

/// `POST /collect-ohlcv`
///
/// Stage 2 requires today's market-cap collection to be complete.
async fn collect_ohlcv(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    launch(&state, CollectionStage::Ohlcv).await
}

/// `GET /collect-progress`
async fn collect_progress(State(state): State<Arc<AppState>>) -> Json<ProgressSnapshot> {
    Json(state.registry().collect().snapshot())
}
