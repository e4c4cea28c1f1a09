//! HTTP route handlers.
//!
//! Handlers stay thin: parse the request, call into `kboard-flow`, map the
//! result through [`crate::error::ApiError`]. No pipeline policy lives here.

use std::sync::Arc;

use axum::Router;

use crate::server::AppState;

pub mod best_k;
pub mod collect;
pub mod market;
pub mod status;

/// Builds the `/api` sub-router.
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(collect::routes())
        .merge(best_k::routes())
        .merge(status::routes())
        .merge(market::routes())
}
