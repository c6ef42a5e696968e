//! Engine-agnostic evaluation boundary.
//!
//! The [`LanguageEngine`] trait decouples the session and execution
//! layers from the process that actually evaluates statistical code.
//! The shipped implementation ([`subprocess`]) drives an external R
//! adapter process over newline-delimited JSON; tests substitute
//! scripted engines behind the same trait.

pub mod codec;
pub mod protocol;
pub mod spawner;
pub mod subprocess;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::models::result::RenderedPlot;
use crate::Result;

/// Default plot surface width in pixels (7in at 72dpi).
pub const DEFAULT_PLOT_WIDTH: u32 = 504;
/// Default plot surface height in pixels.
pub const DEFAULT_PLOT_HEIGHT: u32 = 504;
/// Default plot background colour.
pub const DEFAULT_PLOT_BACKGROUND: &str = "white";
/// Default plot text size in points.
pub const DEFAULT_PLOT_POINT_SIZE: u32 = 12;

/// Plot surface configuration for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotOptions {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Background colour name understood by the engine.
    pub background: String,
    /// Base text size in points.
    pub point_size: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_PLOT_WIDTH,
            height: DEFAULT_PLOT_HEIGHT,
            background: DEFAULT_PLOT_BACKGROUND.to_string(),
            point_size: DEFAULT_PLOT_POINT_SIZE,
        }
    }
}

/// Channel-capture behaviour for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOptions {
    /// Print top-level expression values, as an interactive console would.
    pub autoprint: bool,
    /// Capture stdout and stderr writes instead of discarding them.
    pub capture_streams: bool,
    /// Capture raised conditions as structured objects instead of letting
    /// them print through the streams.
    pub capture_conditions: bool,
    /// Plot surface configuration.
    pub plot: PlotOptions,
}

impl Default for CaptureOptions {
    /// The lesson defaults: interactive-style autoprint, streams captured,
    /// conditions left to print through stderr.
    fn default() -> Self {
        Self {
            autoprint: true,
            capture_streams: true,
            capture_conditions: false,
            plot: PlotOptions::default(),
        }
    }
}

/// Output gathered from one completed evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture {
    /// Stdout lines in emission order.
    pub stdout: Vec<String>,
    /// Stderr lines (including captured conditions) in emission order.
    pub stderr: Vec<String>,
    /// Plots rendered during the evaluation, in creation order.
    pub plots: Vec<RenderedPlot>,
}

/// Verdict of one evaluation that reached the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Evaluation ran to completion.
    Complete(Capture),
    /// Evaluation stopped on an engine-level error.
    Failed(EvalFailure),
}

/// Fatal evaluation error together with whatever output preceded it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalFailure {
    /// Error message as reported by the engine.
    pub message: String,
    /// Stdout lines captured before the failure.
    pub stdout: Vec<String>,
    /// Stderr lines captured before the failure.
    pub stderr: Vec<String>,
}

/// Capability surface of a live language engine.
///
/// Implementations own the engine process and expose the few operations
/// the session and execution layers need. All methods return boxed
/// futures so the trait stays object-safe behind `Box<dyn LanguageEngine>`.
pub trait LanguageEngine: Send + Sync {
    /// Install the given packages into the engine's library.
    ///
    /// Already-installed packages are a no-op on the engine side, so the
    /// call is safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the engine
    /// rejects the request or the transport fails.
    fn install_packages(
        &self,
        packages: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Write `bytes` to `path` inside the engine's private workspace.
    ///
    /// Paths are workspace-relative; a leading `/` is treated as the
    /// workspace root, so `/data/x.csv` and `data/x.csv` name the same
    /// file. Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the write fails,
    /// or [`AppError::Engine`](crate::AppError::Engine) if `path` escapes
    /// the workspace.
    fn write_file(
        &self,
        path: &str,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Open a fresh evaluation scope.
    ///
    /// The scope owns the capture machinery for its evaluations: the
    /// collected output objects and the graphics device state, reclaimed
    /// as a unit on dispose. Bindings the evaluated code creates land in
    /// the engine's session-global namespace and persist across scopes,
    /// so a learner's variables remain visible to later runs.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the engine
    /// cannot allocate a scope or the transport fails.
    fn open_scope(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EvalScope>>> + Send + '_>>;

    /// Tear the engine down, ending its process if one is attached.
    ///
    /// Teardown failures are logged, not surfaced; after this resolves the
    /// engine must not be used again.
    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// One evaluation scope inside a live engine.
///
/// A scope must be disposed exactly once. Dropping an undisposed scope
/// leaks its capture objects on the engine side until the engine shuts
/// down.
pub trait EvalScope: Send {
    /// Evaluate `code` inside this scope.
    ///
    /// Completion with [`EvalOutcome::Failed`] means the engine itself
    /// reported an evaluation error; `Err` means the request never reached
    /// a verdict (transport loss, engine exit).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the request
    /// could not be delivered or the engine died mid-run.
    fn eval(
        &mut self,
        code: &str,
        options: &CaptureOptions,
    ) -> Pin<Box<dyn Future<Output = Result<EvalOutcome>> + Send + '_>>;

    /// Dispose the scope, reclaiming everything it captured.
    ///
    /// Dispose failures are logged and swallowed; the scope is unusable
    /// either way.
    fn dispose(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Factory for engines, letting tests substitute scripted implementations
/// for the subprocess-backed one.
pub trait EngineLauncher: Send + Sync {
    /// Launch a new engine and complete its boot handshake.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`](crate::AppError::Engine) if the process
    /// cannot be started or the handshake fails.
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn LanguageEngine>>> + Send + '_>>;
}
