//! Structured outcome of one code run and the run-state cell payload.

use bytes::Bytes;

/// One raster image produced by a run's graphics capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPlot {
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// PNG-encoded image bytes.
    pub png: Bytes,
}

/// The structured outcome of running one code string.
///
/// When `error` is set the run failed fatally; the output channels then
/// hold whatever partial output the engine had already captured (never
/// manufactured content).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Ordered standard-output lines.
    pub stdout: Vec<String>,
    /// Ordered diagnostic-output lines.
    pub stderr: Vec<String>,
    /// Rendered plots, in production order.
    pub plots: Vec<RenderedPlot>,
    /// Fatal failure message for this run, if any.
    pub error: Option<String>,
}

impl ExecutionResult {
    /// Successful result carrying the captured channels.
    #[must_use]
    pub fn success(stdout: Vec<String>, stderr: Vec<String>, plots: Vec<RenderedPlot>) -> Self {
        Self {
            stdout,
            stderr,
            plots,
            error: None,
        }
    }

    /// Failed result with empty output channels.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Failed result preserving partial text output captured before the
    /// failure. Plots are never attached to a failed run.
    #[must_use]
    pub fn failure_with_partial(
        message: impl Into<String>,
        stdout: Vec<String>,
        stderr: Vec<String>,
    ) -> Self {
        Self {
            stdout,
            stderr,
            plots: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Whether the run completed without a fatal error.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Execution state observed by frontends: not yet run, running, or settled.
///
/// `Running` doubles as the busy flag; entering it clears the previous
/// settled result in the same transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    /// No run has produced a result since the last clear.
    #[default]
    Idle,
    /// A run is in flight; triggers must stay disabled.
    Running,
    /// The most recent run settled with this result.
    Settled(ExecutionResult),
}

impl RunState {
    /// Whether a run is currently in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// The settled result, if the last run has finished.
    #[must_use]
    pub fn result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::Settled(result) => Some(result),
            Self::Idle | Self::Running => None,
        }
    }
}
