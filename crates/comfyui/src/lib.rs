//! ComfyUI engine integration.
//!
//! Wraps the `comfy` CLI behind a command seam, manages the single
//! long-lived engine process per worker (lazy launch, readiness probe,
//! terminal failure), dispatches materialized jobs as blocking
//! subprocess runs, and collects result artifacts from the engine's
//! shared output directory by filename prefix.

pub mod artifacts;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod engine;
