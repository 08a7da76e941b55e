use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use renderbox_comfyui::artifacts::ArtifactError;
use renderbox_comfyui::dispatcher::DispatchError;
use renderbox_comfyui::engine::EngineStartError;
use renderbox_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain and engine error types and implements
/// [`IntoResponse`] to produce consistent JSON error responses. No stage
/// retries or remediates; the first failure propagates here unchanged.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `renderbox_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The engine failed to reach readiness; the worker is unhealthy.
    #[error(transparent)]
    EngineStart(#[from] EngineStartError),

    /// A dispatch failed (timeout, engine failure, or submission error).
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Artifact collection failed after a successful dispatch.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Configuration(msg) => {
                    tracing::error!(error = %msg, "Configuration error surfaced at request time");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CONFIGURATION_ERROR",
                        "Service is misconfigured".to_string(),
                    )
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::EngineStart(err) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ENGINE_UNAVAILABLE",
                err.to_string(),
            ),

            AppError::Dispatch(dispatch) => match dispatch {
                DispatchError::Timeout { .. } => (
                    StatusCode::GATEWAY_TIMEOUT,
                    "DISPATCH_TIMEOUT",
                    dispatch.to_string(),
                ),
                DispatchError::Execution { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENGINE_EXECUTION_ERROR",
                    dispatch.to_string(),
                ),
                DispatchError::Submit(msg) => {
                    tracing::error!(error = %msg, "Job submission failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Artifact(artifact) => match artifact {
                ArtifactError::NotFound { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ARTIFACT_NOT_FOUND",
                    artifact.to_string(),
                ),
                ArtifactError::Io(e) => {
                    tracing::error!(error = %e, "Artifact read failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
