//! Latest persisted market snapshot endpoint.
//!
//! ```text
//! GET /market-latest - Latest market-cap snapshot, largest caps first
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use kboard_core::store::MarketSnapshotRow;

use crate::error::ApiResult;
use crate::server::AppState;

/// Response body for `GET /market-latest`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketLatestResponse {
    /// Always true.
    pub success: bool,
    /// Snapshot rows, market-cap descending. Empty before the first
    /// collection.
    pub data: Vec<MarketSnapshotRow>,
}

/// Builds the market routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/market-latest", get(market_latest))
}

/// `GET /market-latest`
async fn market_latest(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MarketLatestResponse>> {
    let rows = state.store().latest_market_snapshot().await?;
    Ok(Json(MarketLatestResponse {
        success: true,
        data: rows,
    }))
}
