//! Engine command seam.
//!
//! [`EngineCommand`] abstracts the `comfy` CLI so the lifecycle manager
//! and dispatcher can be exercised against stubs. [`ComfyCli`] is the
//! production implementation: it spawns the CLI via [`tokio::process`]
//! and probes the engine HTTP endpoint for readiness.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::EngineConfig;

/// Maximum stderr captured per command run (10 MiB).
///
/// Output beyond this limit is truncated so a pathologically verbose
/// engine run cannot exhaust worker memory.
const MAX_CAPTURE_BYTES: usize = 10 * 1024 * 1024;

/// Errors from running an engine command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command could not be spawned or waited on.
    #[error("Failed to run engine command: {0}")]
    Io(#[from] std::io::Error),

    /// The command ran but exited with a non-zero code.
    #[error("Engine command exited with code {exit_code}: {stderr}")]
    Exit {
        /// Process exit code (`-1` if killed by signal).
        exit_code: i32,
        /// Captured stderr output, truncated to [`MAX_CAPTURE_BYTES`].
        stderr: String,
    },
}

/// Blocking submit-and-await interface to the inference engine.
///
/// Implementations must tolerate concurrent `run_job` calls on the same
/// value; the engine interleaves submissions itself.
#[async_trait]
pub trait EngineCommand: Send + Sync {
    /// Start the engine process in the background. Resolves when the
    /// launch command exits; readiness is confirmed separately via
    /// [`EngineCommand::is_ready`].
    async fn launch(&self) -> Result<(), CommandError>;

    /// Probe whether the engine is accepting jobs.
    async fn is_ready(&self) -> bool;

    /// Run the job description at `job_path`, blocking until the engine
    /// reports terminal success or failure.
    async fn run_job(&self, job_path: &Path) -> Result<(), CommandError>;
}

/// Production engine command backed by the `comfy` CLI.
pub struct ComfyCli {
    bin: String,
    api_url: String,
    run_timeout_secs: u64,
    probe: reqwest::Client,
}

impl ComfyCli {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            bin: config.comfy_bin.clone(),
            api_url: config.api_url.clone(),
            run_timeout_secs: config.dispatch_timeout_secs,
            probe: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EngineCommand for ComfyCli {
    async fn launch(&self) -> Result<(), CommandError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(["launch", "--background"]);
        tracing::info!(bin = %self.bin, "Launching engine process");
        run_checked(cmd).await
    }

    async fn is_ready(&self) -> bool {
        // ComfyUI answers /system_stats as soon as it accepts jobs.
        match self
            .probe
            .get(format!("{}/system_stats", self.api_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn run_job(&self, job_path: &Path) -> Result<(), CommandError> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("run")
            .arg("--workflow")
            .arg(job_path)
            .arg("--wait")
            .arg("--timeout")
            .arg(self.run_timeout_secs.to_string());
        run_checked(cmd).await
    }
}

/// Spawn `cmd`, capture stderr, and map a non-zero exit to
/// [`CommandError::Exit`].
///
/// `kill_on_drop` ensures the child dies if the caller's future is
/// dropped (e.g. a dispatch timeout or client disconnect).
async fn run_checked(mut cmd: Command) -> Result<(), CommandError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;

    // Read output streams in spawned tasks so `child.wait()` can proceed.
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    let status = child.wait().await?;
    let _ = stdout_task.await;
    let stderr_bytes = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(CommandError::Exit {
            exit_code: status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&stderr_bytes).trim().to_string(),
        })
    }
}

/// Read an entire output stream into a byte buffer, capped at
/// [`MAX_CAPTURE_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_CAPTURE_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
