use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Engine lifecycle state (`not_started`, `starting`, `ready`, `failed`).
    pub engine: &'static str,
}

/// GET /health -- returns service and engine health.
///
/// A worker whose engine has failed reports `degraded` so the platform
/// stops routing traffic to it.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = state.engine.state();

    let status = if engine == renderbox_comfyui::engine::EngineState::Failed {
        "degraded"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        engine: engine.as_str(),
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
