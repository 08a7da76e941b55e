//! Route definitions.
//!
//! `/health` is mounted at the root; everything else lives under
//! `/api/v1`.

pub mod health;

use axum::routing::post;
use axum::Router;

use crate::handlers::generate;
use crate::state::AppState;

/// Routes nested under `/api/v1`.
///
/// ```text
/// POST /generate    generate::generate
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/generate", post(generate::generate))
}
