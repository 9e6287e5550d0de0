//! Read-only Axum dashboard over the result store and the case source.
//!
//! Provides:
//!   GET /api/results   → { results, markets, timestamp }, each file verbatim
//!   GET /api/status    → { status, completed, total, metrics }
//!
//! Files are re-read on every request; the run loop writes them atomically,
//! so no coordination with the writer is needed.

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared state for the dashboard routes.
#[derive(Clone)]
pub struct DashboardState {
    pub results_path: Arc<PathBuf>,
    pub cases_path: Arc<PathBuf>,
}

impl DashboardState {
    pub fn new(results_path: impl Into<PathBuf>, cases_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: Arc::new(results_path.into()),
            cases_path: Arc::new(cases_path.into()),
        }
    }
}

/// Build the Axum router.
pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/api/results", get(api_results))
        .route("/api/status", get(api_status))
        .with_state(state)
}

/// Start the dashboard server.
pub async fn serve(state: DashboardState, bind_addr: &str) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = bind_addr, "dashboard listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// File contents as JSON, or `{"error": msg}` when missing or malformed.
fn load_json(path: &Path) -> Value {
    let loaded = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|e| e.to_string()));
    match loaded {
        Ok(v) => v,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "dashboard file unreadable");
            json!({ "error": e })
        }
    }
}

// --- API Handlers ---

async fn api_results(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(json!({
        "results": load_json(&state.results_path),
        "markets": load_json(&state.cases_path),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn api_status(State(state): State<DashboardState>) -> impl IntoResponse {
    let doc = load_json(&state.results_path);
    Json(json!({
        "status": doc.get("status").cloned().unwrap_or_else(|| json!("unknown")),
        "completed": doc.get("completed").cloned().unwrap_or_else(|| json!(0)),
        "total": doc.get("totalCases").cloned().unwrap_or_else(|| json!(0)),
        "metrics": doc.get("metrics").cloned().unwrap_or_else(|| json!({})),
    }))
}
