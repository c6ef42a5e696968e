//! One code run, from source string to [`ExecutionResult`].
//!
//! The pipeline is total: engine and evaluation failures fold into the
//! result's `error` field instead of surfacing as `Err`, so callers
//! always receive exactly one result per run.

use tracing::{debug, warn};

use crate::engine::{CaptureOptions, EvalOutcome};
use crate::models::result::ExecutionResult;
use crate::session::SessionHandle;

/// Evaluate `code` in a fresh capture scope of the session's engine.
///
/// Opens a scope, evaluates with the lesson capture defaults, and
/// disposes the scope on every path, success or failure. An engine-level
/// evaluation failure produces a result whose `error` is set and whose
/// output channels hold whatever the engine captured before failing;
/// output is preserved, never manufactured.
pub async fn run(session: &SessionHandle, code: &str) -> ExecutionResult {
    let mut scope = match session.engine.open_scope().await {
        Ok(scope) => scope,
        Err(err) => {
            warn!(
                session_id = session.id.as_str(),
                error = %err,
                "failed to open evaluation scope"
            );
            return ExecutionResult::failure(err.to_string());
        }
    };

    let options = CaptureOptions::default();
    let outcome = scope.eval(code, &options).await;

    // The scope is disposed before the result is shaped, so capture
    // state never outlives the run that created it. Bindings the code
    // made live on in the session's namespace.
    scope.dispose().await;

    match outcome {
        Ok(EvalOutcome::Complete(capture)) => {
            debug!(
                session_id = session.id.as_str(),
                stdout_lines = capture.stdout.len(),
                stderr_lines = capture.stderr.len(),
                plots = capture.plots.len(),
                "evaluation complete"
            );
            ExecutionResult::success(capture.stdout, capture.stderr, capture.plots)
        }
        Ok(EvalOutcome::Failed(failure)) => {
            debug!(
                session_id = session.id.as_str(),
                error = failure.message.as_str(),
                "evaluation failed"
            );
            ExecutionResult::failure_with_partial(failure.message, failure.stdout, failure.stderr)
        }
        Err(err) => {
            warn!(
                session_id = session.id.as_str(),
                error = %err,
                "evaluation did not reach a verdict"
            );
            ExecutionResult::failure(err.to_string())
        }
    }
}
