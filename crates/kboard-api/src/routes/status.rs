//! Derived pipeline status endpoint.
//!
//! ```text
//! GET /collection-status - Recompute the three stage flags from the store
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use kboard_flow::StatusReport;

use crate::error::ApiResult;
use crate::server::AppState;

/// Response body for `GET /collection-status`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    /// Always true.
    pub success: bool,
    /// The freshly derived report.
    pub data: StatusReport,
}

/// Builds the status routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/collection-status", get(collection_status))
}

/// `GET /collection-status`
///
/// Always recomputed from the store; never cached.
async fn collection_status(State(state): State<Arc<AppState>>) -> ApiResult<Json<StatusResponse>> {
    let report = state.evaluator().evaluate().await?;
    Ok(Json(StatusResponse {
        success: true,
        data: report,
    }))
}
