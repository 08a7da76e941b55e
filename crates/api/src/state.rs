use std::sync::Arc;

use renderbox_comfyui::config::EngineConfig;
use renderbox_comfyui::engine::EngineLifecycle;
use renderbox_core::template::WorkflowTemplate;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything is behind an `Arc`. The template is
/// read-only after load and the engine lifecycle coordinates its own
/// interior state, so no locking happens at this level.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Engine configuration (jobs dir, output dir, deadlines).
    pub engine_config: Arc<EngineConfig>,
    /// The canonical workflow template, loaded once at startup.
    pub template: Arc<WorkflowTemplate>,
    /// Engine lifecycle manager (lazy at-most-once launch).
    pub engine: Arc<EngineLifecycle>,
}
