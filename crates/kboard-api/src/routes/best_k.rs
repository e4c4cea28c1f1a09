//! Best-K computation endpoints (stage 3).
//!
//! ```text
//! POST /calculate-best-k - Resolve a window and launch the Best-K worker
//! GET  /best-k-progress  - Live Best-K progress
//! GET  /best-k-periods   - Period and market menu for clients
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use kboard_core::clock::today_kst;
use kboard_flow::{window, CollectionStage, PeriodKey, ProgressSnapshot};

use crate::error::ApiResult;
use crate::routes::collect::AcceptedResponse;
use crate::server::AppState;

/// Request body for `POST /calculate-best-k`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestKRequest {
    /// Period key (`days_3`, `week_1`, ..., `custom`).
    pub period: String,
    /// Required when `period` is `custom`.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    /// Required when `period` is `custom`.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Optional market filter (e.g. KOSPI).
    #[serde(default)]
    pub market: Option<String>,
}

/// One entry in the period menu.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodEntry {
    /// Wire key accepted by `POST /calculate-best-k`.
    pub key: &'static str,
    /// Display label.
    pub label: &'static str,
    /// Lookback length in days.
    pub days: i64,
}

/// Response body for `GET /best-k-periods`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMenuResponse {
    /// Always true.
    pub success: bool,
    /// The menu payload.
    pub data: PeriodMenu,
}

/// The period and market menu.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMenu {
    /// Symbolic periods in menu order.
    pub periods: Vec<PeriodEntry>,
    /// Markets offered as filters.
    pub markets: Vec<String>,
}

/// Builds the Best-K routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/calculate-best-k", post(calculate_best_k))
        .route("/best-k-progress", get(best_k_progress))
        .route("/best-k-periods", get(best_k_periods))
}

/// `POST /calculate-best-k`
///
/// Resolves the requested period to a concrete window before launching, so
/// malformed requests fail fast without touching the stage slot.
async fn calculate_best_k(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BestKRequest>,
) -> ApiResult<(StatusCode, Json<AcceptedResponse>)> {
    let key: PeriodKey = body.period.parse()?;
    let spec = window::resolve(
        key,
        body.start_date,
        body.end_date,
        body.market,
        today_kst(),
    )?;

    state
        .orchestrator()
        .request_stage(CollectionStage::BestK, Some(spec))
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            success: true,
            message: "best-k computation started".to_string(),
        }),
    ))
}

/// `GET /best-k-progress`
async fn best_k_progress(State(state): State<Arc<AppState>>) -> Json<ProgressSnapshot> {
    Json(state.registry().best_k().snapshot())
}

/// `GET /best-k-periods`
async fn best_k_periods(State(state): State<Arc<AppState>>) -> Json<PeriodMenuResponse> {
    let periods = PeriodKey::SYMBOLIC
        .iter()
        .filter_map(|key| {
            key.lookback_days().map(|days| PeriodEntry {
                key: key.as_str(),
                label: key.label(),
                days,
            })
        })
        .collect();

    Json(PeriodMenuResponse {
        success: true,
        data: PeriodMenu {
            periods,
            markets: state.config.markets.clone(),
        },
    })
}
