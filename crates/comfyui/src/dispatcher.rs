//! Job dispatcher: submit a materialized job to the engine and block
//! until completion, failure, or timeout.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use renderbox_core::workflow::{MaterializedJob, OutputTag};

use crate::command::CommandError;
use crate::engine::EngineHandle;

/// Errors from a job dispatch.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The job did not reach a terminal state within the deadline. The
    /// engine-side outcome is unknown: the CLI child is killed, but the
    /// engine may finish the job regardless.
    #[error("Job did not complete within {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// The engine reported terminal failure.
    #[error("Engine reported failure (exit {exit_code}): {stderr}")]
    Execution { exit_code: i32, stderr: String },

    /// The job could not be submitted (file write or process spawn).
    #[error("Failed to submit job: {0}")]
    Submit(String),
}

/// Write the job description to `<jobs_dir>/<tag>.json` and run it on
/// the engine, blocking until terminal success or failure.
///
/// Concurrent dispatches to the same handle are permitted; no queuing is
/// imposed beyond what the engine provides. If the calling future is
/// dropped (client disconnect), the CLI child process is killed, but the
/// engine-side job is not guaranteed to halt — a known limitation of the
/// command contract.
pub async fn dispatch(
    handle: &EngineHandle,
    job: &MaterializedJob,
    tag: &OutputTag,
    jobs_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, DispatchError> {
    let job_path = write_job_file(job, tag, jobs_dir).await?;
    let start = Instant::now();

    tracing::info!(tag = %tag, job_path = %job_path.display(), "Dispatching job");

    match tokio::time::timeout(timeout, handle.command().run_job(&job_path)).await {
        Ok(Ok(())) => {
            tracing::info!(
                tag = %tag,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Job completed",
            );
            Ok(job_path)
        }
        Ok(Err(CommandError::Exit { exit_code, stderr })) => {
            tracing::error!(tag = %tag, exit_code, "Engine reported job failure");
            Err(DispatchError::Execution { exit_code, stderr })
        }
        Ok(Err(CommandError::Io(e))) => Err(DispatchError::Submit(e.to_string())),
        Err(_) => {
            let elapsed_ms = start.elapsed().as_millis() as u64;
            tracing::error!(tag = %tag, elapsed_ms, "Job dispatch timed out");
            Err(DispatchError::Timeout { elapsed_ms })
        }
    }
}

/// Serialize the job to its per-request file under `jobs_dir`.
///
/// The file name is the output tag, so concurrent requests never collide
/// and the file doubles as an audit record of what was submitted.
async fn write_job_file(
    job: &MaterializedJob,
    tag: &OutputTag,
    jobs_dir: &Path,
) -> Result<PathBuf, DispatchError> {
    tokio::fs::create_dir_all(jobs_dir)
        .await
        .map_err(|e| DispatchError::Submit(format!("Cannot create jobs dir: {e}")))?;

    let job_path = jobs_dir.join(format!("{tag}.json"));
    tokio::fs::write(&job_path, job.to_json_bytes())
        .await
        .map_err(|e| DispatchError::Submit(format!("Cannot write job file: {e}")))?;

    Ok(job_path)
}
