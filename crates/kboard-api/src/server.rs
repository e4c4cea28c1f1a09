//! API server implementation.
//!
//! Provides health, ready, and the pipeline API endpoints.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use kboard_core::store::{MarketStore, MemoryStore};
use kboard_core::Result;
use kboard_flow::{Orchestrator, ProgressRegistry, StatusEvaluator};

use crate::config::{Config, CorsConfig};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Persistent market-data store.
    store: Arc<dyn MarketStore>,
    /// The stage gate.
    orchestrator: Arc<Orchestrator>,
    /// Live progress trackers.
    registry: Arc<ProgressRegistry>,
    /// Status evaluator shared with the orchestrator's thresholds.
    evaluator: StatusEvaluator,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &"<MarketStore>")
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

impl AppState {
    /// Creates new application state over the given store.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn MarketStore>) -> Self {
        let registry = Arc::new(ProgressRegistry::new());
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.stage_workers(),
            config.thresholds,
        ));
        let evaluator = StatusEvaluator::new(Arc::clone(&store), config.thresholds);
        Self {
            config,
            store,
            orchestrator,
            registry,
            evaluator,
        }
    }

    /// The persistent store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn MarketStore> {
        Arc::clone(&self.store)
    }

    /// The stage gate.
    #[must_use]
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The progress registry.
    #[must_use]
    pub fn registry(&self) -> &ProgressRegistry {
        &self.registry
    }

    /// The status evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &StatusEvaluator {
        &self.evaluator
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// Returns 200 OK if the service is alive. This is a shallow check that
/// doesn't verify dependencies.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
///
/// Returns 200 OK once the store answers a cheap aggregate query.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.market_cap_summary().await {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                ready: false,
                message: Some(format!("store check failed: {e}")),
            }),
        ),
    }
}

// ============================================================================
// Server
// ============================================================================

/// The kboard API server.
pub struct Server {
    config: Config,
    store: Arc<dyn MarketStore>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("store", &"<MarketStore>")
            .finish()
    }
}

impl Server {
    /// Creates a new server with the given configuration.
    ///
    /// Defaults to the in-memory store; use `with_store` for production.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Creates a new server with an explicit store.
    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn MarketStore>) -> Self {
        Self { config, store }
    }

    /// Creates a new `ServerBuilder`.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the router with all routes and middleware.
    fn create_router(&self) -> (Arc<AppState>, Router) {
        let state = Arc::new(AppState::new(self.config.clone(), Arc::clone(&self.store)));

        let cors = self.build_cors_layer();

        let router = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .nest("/api", crate::routes::api_routes())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&state));

        (state, router)
    }

    fn build_cors_layer(&self) -> CorsLayer {
        let CorsConfig {
            allowed_origins,
            max_age_seconds,
        } = &self.config.cors;

        let origin = if allowed_origins.is_empty() {
            AllowOrigin::from(Any)
        } else {
            let origins: Vec<HeaderValue> = allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            AllowOrigin::list(origins)
        };

        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any)
            .max_age(Duration::from_secs(*max_age_seconds))
    }

    /// Serves HTTP until the process is stopped.
    ///
    /// Also spawns the daily collection schedule when configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn serve(&self) -> Result<()> {
        let (state, router) = self.create_router();

        if let Some(schedule) = self.config.daily_collect {
            let orchestrator = Arc::clone(state.orchestrator());
            tokio::spawn(kboard_flow::scheduler::run_daily(orchestrator, schedule));
        }

        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| {
                kboard_core::Error::invalid_input(format!("invalid bind address: {e}"))
            })?;

        tracing::info!(%addr, "kboard API listening");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| kboard_core::Error::internal(format!("bind failed: {e}")))?;
        axum::serve(listener, router)
            .await
            .map_err(|e| kboard_core::Error::internal(format!("server error: {e}")))?;
        Ok(())
    }

    /// Builds a router for in-process testing (no listener).
    #[must_use]
    pub fn test_router(&self) -> Router {
        self.create_router().1
    }
}

/// Builder for [`Server`].
#[derive(Default)]
pub struct ServerBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn MarketStore>>,
}

impl ServerBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn MarketStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Builds the server, defaulting to debug config and the memory store.
    #[must_use]
    pub fn build(self) -> Server {
        let config = self.config.unwrap_or_default();
        match self.store {
            Some(store) => Server::with_store(config, store),
            None => Server::new(config),
        }
    }
}
