use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration loaded from environment variables.
///
/// All fields have defaults matching a stock `comfy` CLI install.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the `comfy` CLI binary (default: `comfy`).
    pub comfy_bin: String,
    /// Base HTTP URL of the running engine, used by the readiness probe
    /// (default: `http://127.0.0.1:8188`).
    pub api_url: String,
    /// Directory the engine writes artifacts into
    /// (default: `/root/comfy/ComfyUI/output`).
    pub output_dir: PathBuf,
    /// Directory materialized job files are written to before dispatch
    /// (default: `/tmp/renderbox-jobs`).
    pub jobs_dir: PathBuf,
    /// Deadline for the engine to become ready after launch (default: `60`).
    pub startup_timeout_secs: u64,
    /// Deadline for a single job run (default: `1200`).
    pub dispatch_timeout_secs: u64,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                      |
    /// |-------------------------------|------------------------------|
    /// | `COMFY_BIN`                   | `comfy`                      |
    /// | `COMFY_API_URL`               | `http://127.0.0.1:8188`      |
    /// | `COMFY_OUTPUT_DIR`            | `/root/comfy/ComfyUI/output` |
    /// | `JOBS_DIR`                    | `/tmp/renderbox-jobs`        |
    /// | `ENGINE_STARTUP_TIMEOUT_SECS` | `60`                         |
    /// | `DISPATCH_TIMEOUT_SECS`       | `1200`                       |
    pub fn from_env() -> Self {
        let comfy_bin = std::env::var("COMFY_BIN").unwrap_or_else(|_| "comfy".into());
        let api_url =
            std::env::var("COMFY_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8188".into());
        let output_dir = std::env::var("COMFY_OUTPUT_DIR")
            .unwrap_or_else(|_| "/root/comfy/ComfyUI/output".into())
            .into();
        let jobs_dir = std::env::var("JOBS_DIR")
            .unwrap_or_else(|_| "/tmp/renderbox-jobs".into())
            .into();

        let startup_timeout_secs: u64 = std::env::var("ENGINE_STARTUP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("ENGINE_STARTUP_TIMEOUT_SECS must be a valid u64");

        let dispatch_timeout_secs: u64 = std::env::var("DISPATCH_TIMEOUT_SECS")
            .unwrap_or_else(|_| "1200".into())
            .parse()
            .expect("DISPATCH_TIMEOUT_SECS must be a valid u64");

        Self {
            comfy_bin,
            api_url,
            output_dir,
            jobs_dir,
            startup_timeout_secs,
            dispatch_timeout_secs,
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}
