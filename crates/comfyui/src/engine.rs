//! Engine lifecycle manager.
//!
//! Owns the single ComfyUI process for the life of a worker. The engine
//! is launched lazily by the first request, at most once: concurrent
//! callers during startup wait on the same outcome. A failed start is
//! terminal for the worker — subsequent calls fail fast instead of
//! relaunching, since engine state is not recoverable in place.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::command::EngineCommand;

/// Interval between readiness probes while the engine is starting.
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Observable lifecycle states, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Starting,
    Ready,
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Errors from establishing engine readiness.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineStartError {
    /// The engine did not become ready within the startup deadline.
    #[error("Engine did not become ready within {deadline_secs}s")]
    Timeout { deadline_secs: u64 },

    /// The launch command itself failed.
    #[error("Engine launch failed: {0}")]
    Launch(String),
}

/// Shared handle to the running engine.
///
/// Cheap to clone; read concurrently by every in-flight dispatch on the
/// worker, never mutated after creation.
#[derive(Clone)]
pub struct EngineHandle {
    command: Arc<dyn EngineCommand>,
}

impl EngineHandle {
    pub fn command(&self) -> &dyn EngineCommand {
        self.command.as_ref()
    }
}

// Manual impl: the trait object inside has no `Debug` bound.
impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

/// Internal lifecycle slot published through the watch channel.
#[derive(Clone)]
enum Slot {
    NotStarted,
    Starting,
    Ready(EngineHandle),
    Failed(EngineStartError),
}

/// Lazy, at-most-once engine starter.
///
/// Created once at application startup and shared behind an `Arc`.
pub struct EngineLifecycle {
    command: Arc<dyn EngineCommand>,
    startup_timeout: Duration,
    state_tx: watch::Sender<Slot>,
}

impl EngineLifecycle {
    pub fn new(command: Arc<dyn EngineCommand>, startup_timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(Slot::NotStarted);
        Self {
            command,
            startup_timeout,
            state_tx,
        }
    }

    /// Current lifecycle state (for health reporting).
    pub fn state(&self) -> EngineState {
        match &*self.state_tx.borrow() {
            Slot::NotStarted => EngineState::NotStarted,
            Slot::Starting => EngineState::Starting,
            Slot::Ready(_) => EngineState::Ready,
            Slot::Failed(_) => EngineState::Failed,
        }
    }

    /// Return a handle to the ready engine, launching it on first use.
    ///
    /// Exactly one caller performs the launch sequence; everyone else
    /// waits for the same terminal outcome. Once `Failed`, every call
    /// returns the original error without touching the process again.
    pub async fn ensure_ready(&self) -> Result<EngineHandle, EngineStartError> {
        // Claim the start transition if nobody has yet. `send_if_modified`
        // gives atomic read-modify-write over the slot.
        let mut claimed = false;
        self.state_tx.send_if_modified(|slot| {
            if matches!(slot, Slot::NotStarted) {
                *slot = Slot::Starting;
                claimed = true;
                true
            } else {
                false
            }
        });

        if claimed {
            let outcome = self.start().await;
            let result = match &outcome {
                Ok(handle) => Slot::Ready(handle.clone()),
                Err(e) => Slot::Failed(e.clone()),
            };
            // `send_replace` stores the value even with no live
            // receivers; a solo cold start has none.
            self.state_tx.send_replace(result);
            return outcome;
        }

        // Someone else is (or was) starting: follow the channel until a
        // terminal slot appears. The watch channel retains the latest
        // value, so a transition published before we subscribe is not
        // lost.
        let mut rx = self.state_tx.subscribe();
        loop {
            {
                let slot = rx.borrow_and_update();
                match &*slot {
                    Slot::Ready(handle) => return Ok(handle.clone()),
                    Slot::Failed(e) => return Err(e.clone()),
                    Slot::NotStarted | Slot::Starting => {}
                }
            }
            if rx.changed().await.is_err() {
                // Sender dropped without reaching a terminal state.
                return Err(EngineStartError::Launch(
                    "Engine lifecycle was shut down during startup".to_string(),
                ));
            }
        }
    }

    /// Launch the engine and wait for readiness within the deadline.
    async fn start(&self) -> Result<EngineHandle, EngineStartError> {
        tracing::info!(
            startup_timeout_secs = self.startup_timeout.as_secs(),
            "Starting engine",
        );

        let sequence = async {
            self.command
                .launch()
                .await
                .map_err(|e| EngineStartError::Launch(e.to_string()))?;

            // The launch command returning success is not trusted on its
            // own; poll the engine until it answers.
            while !self.command.is_ready().await {
                tokio::time::sleep(PROBE_INTERVAL).await;
            }
            Ok(())
        };

        match tokio::time::timeout(self.startup_timeout, sequence).await {
            Ok(Ok(())) => {
                tracing::info!("Engine ready");
                Ok(EngineHandle {
                    command: Arc::clone(&self.command),
                })
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Engine launch failed; worker is unhealthy");
                Err(e)
            }
            Err(_) => {
                let deadline_secs = self.startup_timeout.as_secs();
                tracing::error!(
                    deadline_secs,
                    "Engine startup deadline exceeded; worker is unhealthy",
                );
                Err(EngineStartError::Timeout { deadline_secs })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use super::*;
    use crate::command::CommandError;

    /// Stub engine with configurable launch behaviour and call counting.
    struct StubEngine {
        launches: AtomicUsize,
        launch_delay: Duration,
        fail_launch: bool,
        ready: bool,
    }

    impl StubEngine {
        fn ok() -> Self {
            Self {
                launches: AtomicUsize::new(0),
                launch_delay: Duration::ZERO,
                fail_launch: false,
                ready: true,
            }
        }

        fn failing() -> Self {
            Self {
                fail_launch: true,
                ..Self::ok()
            }
        }

        fn never_ready() -> Self {
            Self {
                ready: false,
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl EngineCommand for StubEngine {
        async fn launch(&self) -> Result<(), CommandError> {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if !self.launch_delay.is_zero() {
                tokio::time::sleep(self.launch_delay).await;
            }
            if self.fail_launch {
                Err(CommandError::Exit {
                    exit_code: 1,
                    stderr: "no GPU".to_string(),
                })
            } else {
                Ok(())
            }
        }

        async fn is_ready(&self) -> bool {
            self.ready
        }

        async fn run_job(&self, _job_path: &Path) -> Result<(), CommandError> {
            Ok(())
        }
    }

    fn lifecycle(stub: StubEngine, deadline: Duration) -> (Arc<StubEngine>, EngineLifecycle) {
        let stub = Arc::new(stub);
        let lc = EngineLifecycle::new(Arc::clone(&stub) as Arc<dyn EngineCommand>, deadline);
        (stub, lc)
    }

    #[tokio::test]
    async fn starts_lazily_and_only_once() {
        let (stub, lc) = lifecycle(StubEngine::ok(), Duration::from_secs(5));
        assert_eq!(lc.state(), EngineState::NotStarted);

        lc.ensure_ready().await.expect("ready");
        lc.ensure_ready().await.expect("still ready");

        assert_eq!(stub.launches.load(Ordering::SeqCst), 1);
        assert_eq!(lc.state(), EngineState::Ready);
    }

    #[tokio::test]
    async fn solo_start_publishes_terminal_state() {
        // A solo cold start has no subscribed waiters; the terminal slot
        // must still be stored so later sequential callers see it
        // immediately instead of waiting on the channel.
        let (stub, lc) = lifecycle(StubEngine::ok(), Duration::from_secs(5));

        lc.ensure_ready().await.expect("first caller");
        assert_eq!(lc.state(), EngineState::Ready);

        let second = tokio::time::timeout(Duration::from_secs(2), lc.ensure_ready())
            .await
            .expect("second caller must not block on a stored terminal state");
        second.expect("second caller sees Ready");
        assert_eq!(stub.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn solo_failed_start_publishes_terminal_state() {
        let (_stub, lc) = lifecycle(StubEngine::failing(), Duration::from_secs(5));

        let err = lc.ensure_ready().await.unwrap_err();
        assert_matches!(err, EngineStartError::Launch(_));
        assert_eq!(lc.state(), EngineState::Failed);

        let second = tokio::time::timeout(Duration::from_secs(2), lc.ensure_ready())
            .await
            .expect("second caller must not block on a stored terminal state");
        assert_matches!(second, Err(EngineStartError::Launch(_)));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_launch() {
        let (stub, lc) = lifecycle(
            StubEngine {
                launch_delay: Duration::from_millis(50),
                ..StubEngine::ok()
            },
            Duration::from_secs(5),
        );
        let lc = Arc::new(lc);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let lc = Arc::clone(&lc);
                tokio::spawn(async move { lc.ensure_ready().await })
            })
            .collect();

        for task in tasks {
            task.await.expect("join").expect("all callers see Ready");
        }
        assert_eq!(stub.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_start_is_terminal() {
        let (stub, lc) = lifecycle(StubEngine::failing(), Duration::from_secs(5));

        let err = lc.ensure_ready().await.unwrap_err();
        assert_matches!(err, EngineStartError::Launch(_));
        assert_eq!(lc.state(), EngineState::Failed);

        // A second call must not relaunch.
        let err = lc.ensure_ready().await.unwrap_err();
        assert_matches!(err, EngineStartError::Launch(_));
        assert_eq!(stub.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_all_observe_failure() {
        let (stub, lc) = lifecycle(
            StubEngine {
                launch_delay: Duration::from_millis(50),
                ..StubEngine::failing()
            },
            Duration::from_secs(5),
        );
        let lc = Arc::new(lc);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let lc = Arc::clone(&lc);
                tokio::spawn(async move { lc.ensure_ready().await })
            })
            .collect();

        for task in tasks {
            let result = task.await.expect("join");
            assert_matches!(result, Err(EngineStartError::Launch(_)));
        }
        assert_eq!(stub.launches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn startup_deadline_yields_timeout() {
        let (_stub, lc) = lifecycle(StubEngine::never_ready(), Duration::from_millis(100));

        let err = lc.ensure_ready().await.unwrap_err();
        assert_matches!(err, EngineStartError::Timeout { .. });
        assert_eq!(lc.state(), EngineState::Failed);
    }
}
