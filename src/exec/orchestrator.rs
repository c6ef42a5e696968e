//! Execution orchestrator: one run at a time, observable run state.
//!
//! The [`Executor`] sits between frontends and the pipeline. It resolves
//! the live session, runs optional setup code silently before the
//! learner's code, and publishes progress through a watchable
//! [`RunState`] cell so editors can disable their run triggers while a
//! run is in flight.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::exec::pipeline;
use crate::models::result::{ExecutionResult, RunState};
use crate::session::manager::SessionManager;

/// Fixed infrastructure message when no session is ready.
pub const SESSION_NOT_INITIALIZED: &str = "session is not initialized";

/// Prefix attached to the setup failure cause in the final result.
pub const SETUP_ERROR_PREFIX: &str = "setup error: ";

/// Drives executions against the session manager's live session.
///
/// Overlapping [`Executor::execute`] calls are not queued or rejected;
/// frontends gate their triggers on [`Executor::is_busy`]. Each call
/// settles the run cell exactly once.
pub struct Executor {
    manager: Arc<SessionManager>,
    run_tx: watch::Sender<RunState>,
}

impl Executor {
    /// Create an executor with an `Idle` run cell.
    #[must_use]
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let (run_tx, _run_rx) = watch::channel(RunState::Idle);
        Self { manager, run_tx }
    }

    /// Run `code`, optionally preceded by a silent `setup_code` run.
    ///
    /// The run cell moves to `Running` (clearing any previous result),
    /// then settles with exactly one final result:
    ///
    /// - no live session → `failure("session is not initialized")`;
    /// - setup failed → `failure("setup error: <cause>")` with empty
    ///   channels, and the learner's code is not evaluated;
    /// - otherwise the learner code's own result, success or failure.
    ///
    /// The returned result is the same value the cell settles with.
    pub async fn execute(&self, code: &str, setup_code: Option<&str>) -> ExecutionResult {
        self.run_tx.send_replace(RunState::Running);
        debug!(
            code_bytes = code.len(),
            has_setup = setup_code.is_some(),
            "execution started"
        );

        let result = self.run_once(code, setup_code).await;

        debug!(ok = result.is_ok(), "execution settled");
        self.run_tx.send_replace(RunState::Settled(result.clone()));
        result
    }

    /// Snapshot of the run cell.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.run_tx.borrow().clone()
    }

    /// Subscribe to run cell updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.run_tx.subscribe()
    }

    /// Whether a run is currently in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.run_tx.borrow().is_busy()
    }

    /// Discard a settled result (`Settled` → `Idle`).
    ///
    /// No-op while a run is in flight or when there is nothing to clear.
    pub fn clear_result(&self) {
        self.run_tx.send_if_modified(|state| {
            if matches!(state, RunState::Settled(_)) {
                *state = RunState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Produce the single final result for one `execute` call.
    async fn run_once(&self, code: &str, setup_code: Option<&str>) -> ExecutionResult {
        let Some(session) = self.manager.current().await else {
            return ExecutionResult::failure(SESSION_NOT_INITIALIZED);
        };

        if let Some(setup) = setup_code {
            let setup_result = pipeline::run(&session, setup).await;
            if let Some(cause) = setup_result.error {
                debug!(cause = cause.as_str(), "setup run failed, skipping user code");
                return ExecutionResult::failure(format!("{SETUP_ERROR_PREFIX}{cause}"));
            }
        }

        pipeline::run(&session, code).await
    }
}
