//! jt-import library - reference-data import service
//!
//! Loads the organization and posting files into the store, deduplicating on
//! external ids and creating placeholder organizations for forward
//! references. Exposed over HTTP and as a command-line run.

use axum::Router;
use jt_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use error::{ApiError, ApiResult, ImportError, Stage};
pub use services::{ImportOrchestrator, ImportSummary};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Account and role lookups for the authorization gate
    pub db: SqlitePool,
    /// Notification channel for SSE clients
    pub event_bus: EventBus,
    pub orchestrator: ImportOrchestrator,
    /// Base for relative import paths
    pub root_folder: PathBuf,
    /// Shared secret for API authentication (0 = disabled)
    pub shared_secret: i64,
    pub startup_time: Instant,
    pub last_error: Arc<RwLock<Option<String>>>,
    /// Held for the duration of an import run
    pub import_running: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        orchestrator: ImportOrchestrator,
        root_folder: PathBuf,
        shared_secret: i64,
    ) -> Self {
        Self {
            db,
            event_bus,
            orchestrator,
            root_folder,
            shared_secret,
            startup_time: Instant::now(),
            last_error: Arc::new(RwLock::new(None)),
            import_running: Arc::new(Mutex::new(())),
        }
    }
}

/// Build application router
///
/// `/import/run` sits behind the authorization gate; `/health` and `/events`
/// are open.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};
    use tower_http::trace::TraceLayer;

    let protected = Router::new()
        .route("/import/run", post(api::run_import))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new()
        .route("/events", get(api::event_stream))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
