//! Handler for prompt-driven image generation.
//!
//! Routes:
//! - `POST /generate` — materialize the template with the caller's
//!   parameters, run it on the engine, and return the artifact bytes.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use renderbox_comfyui::{artifacts, dispatcher};
use renderbox_core::workflow::{MaterializedJob, OutputTag};
use serde_json::Value;

use crate::error::AppResult;
use crate::state::AppState;

/// POST /api/v1/generate
///
/// Body: `{ "prompt": string }`. Unknown keys are rejected. On success
/// the response body is the raw artifact with its content type.
///
/// Stage order matters: parameter validation happens before the engine
/// is touched, so a bad request on a cold worker never launches the
/// engine.
pub async fn generate(
    State(state): State<AppState>,
    Json(params): Json<serde_json::Map<String, Value>>,
) -> AppResult<impl IntoResponse> {
    let (job, tag) = state.template.materialize(&params)?;

    persist_audit_copy(&state, &job, &tag).await;

    let handle = state.engine.ensure_ready().await?;

    dispatcher::dispatch(
        &handle,
        &job,
        &tag,
        &state.engine_config.jobs_dir,
        state.engine_config.dispatch_timeout(),
    )
    .await?;

    let artifact = artifacts::collect(&state.engine_config.output_dir, &tag).await?;

    tracing::info!(
        tag = %tag,
        bytes = artifact.bytes.len(),
        content_type = artifact.content_type,
        "Returning artifact",
    );

    Ok((
        [(header::CONTENT_TYPE, artifact.content_type)],
        artifact.bytes,
    ))
}

/// Best-effort audit copy of the materialized job.
///
/// Failure is logged and never fails the request; the job file written
/// by the dispatcher remains the authoritative submission record.
async fn persist_audit_copy(state: &AppState, job: &MaterializedJob, tag: &OutputTag) {
    let Some(dir) = &state.config.audit_dir else {
        return;
    };

    let write = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(format!("{tag}.json")), job.to_json_bytes()).await
    };

    if let Err(e) = write.await {
        tracing::warn!(tag = %tag, dir = %dir.display(), error = %e, "Audit copy failed");
    }
}
