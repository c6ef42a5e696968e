//! Wire protocol between the supervisor and an engine adapter process.
//!
//! Every message is one NDJSON line. Requests flow to the adapter's stdin
//! and carry a numeric correlation `id`; the adapter answers each request
//! with exactly one response frame echoing that `id` on its stdout.
//!
//! Methods, in the order a session uses them:
//!
//! - `initialize`: handshake request sent once after the ready signal;
//!   the adapter replies with an `initialized` frame.
//! - `packages/install`: install the configured package set.
//! - `scope/open`: allocate an evaluation scope; result carries `scope`.
//! - `eval`: evaluate code inside a scope with capture options.
//! - `scope/close`: dispose a scope and everything it captured.
//! - `shutdown`: orderly teardown; the adapter replies, then exits.
//!
//! A response frame is either `{"id": n, "result": {…}}` or
//! `{"id": n, "error": {"message": …, "stdout": […], "stderr": […]}}`.
//! For `eval` the error object carries the output that preceded the
//! failure; for every other method those arrays are empty.

use base64::Engine as _;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{Capture, CaptureOptions, EvalFailure, EvalOutcome};
use crate::models::result::RenderedPlot;
use crate::{AppError, Result};

/// Protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: u32 = 1;

/// Client name advertised during the handshake.
pub const CLIENT_NAME: &str = "stat-lab";

// ── Requests ─────────────────────────────────────────────────────────────────

/// Build the `initialize` handshake request.
#[must_use]
pub fn initialize_request(id: u64) -> Value {
    json!({
        "method": "initialize",
        "id": id,
        "params": {
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": CLIENT_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        },
    })
}

/// Build a `packages/install` request for the given package names.
#[must_use]
pub fn install_request(id: u64, packages: &[String]) -> Value {
    json!({
        "method": "packages/install",
        "id": id,
        "params": { "packages": packages },
    })
}

/// Build a `scope/open` request.
#[must_use]
pub fn open_scope_request(id: u64) -> Value {
    json!({
        "method": "scope/open",
        "id": id,
        "params": {},
    })
}

/// Build an `eval` request for `code` inside scope `scope`.
///
/// # Errors
///
/// Returns [`AppError::Engine`] if the capture options cannot be
/// serialised, which indicates a bug rather than a runtime condition.
pub fn eval_request(id: u64, scope: u64, code: &str, options: &CaptureOptions) -> Result<Value> {
    let capture = serde_json::to_value(options)
        .map_err(|e| AppError::Engine(format!("malformed capture options: {e}")))?;
    Ok(json!({
        "method": "eval",
        "id": id,
        "params": {
            "scope": scope,
            "code": code,
            "capture": capture,
        },
    }))
}

/// Build a `scope/close` request for scope `scope`.
#[must_use]
pub fn close_scope_request(id: u64, scope: u64) -> Value {
    json!({
        "method": "scope/close",
        "id": id,
        "params": { "scope": scope },
    })
}

/// Build a `shutdown` request.
#[must_use]
pub fn shutdown_request(id: u64) -> Value {
    json!({
        "method": "shutdown",
        "id": id,
        "params": {},
    })
}

// ── Responses ────────────────────────────────────────────────────────────────

/// One adapter response, correlated to a request by `id`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    /// Correlation id echoed from the request.
    pub id: u64,
    /// Result payload when the request succeeded.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload when the request failed.
    #[serde(default)]
    pub error: Option<WireError>,
}

/// Error payload inside a response frame.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    /// Human-readable failure message.
    pub message: String,
    /// Stdout lines captured before the failure (`eval` only).
    #[serde(default)]
    pub stdout: Vec<String>,
    /// Stderr lines captured before the failure (`eval` only).
    #[serde(default)]
    pub stderr: Vec<String>,
}

/// Result payload of `scope/open`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScopeOpened {
    /// Adapter-assigned scope identifier.
    pub scope: u64,
}

/// Result payload of `eval` when evaluation completed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvalPayload {
    /// Stdout lines in emission order.
    #[serde(default)]
    pub stdout: Vec<String>,
    /// Stderr lines in emission order.
    #[serde(default)]
    pub stderr: Vec<String>,
    /// Plots rendered during the evaluation.
    #[serde(default)]
    pub plots: Vec<PlotPayload>,
}

/// One rendered plot on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct PlotPayload {
    /// Surface width in pixels.
    pub width: u32,
    /// Surface height in pixels.
    pub height: u32,
    /// Base64-encoded PNG bytes.
    pub png: String,
}

impl PlotPayload {
    /// Decode the base64 PNG payload into a [`RenderedPlot`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the payload is not valid base64.
    pub fn decode(&self) -> Result<RenderedPlot> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.png)
            .map_err(|e| AppError::Engine(format!("malformed plot payload: {e}")))?;
        Ok(RenderedPlot {
            width: self.width,
            height: self.height,
            png: bytes.into(),
        })
    }
}

impl EvalPayload {
    /// Decode the payload into a [`Capture`], materialising plot bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if any plot payload is not valid base64.
    pub fn into_capture(self) -> Result<Capture> {
        let mut plots = Vec::with_capacity(self.plots.len());
        for plot in &self.plots {
            plots.push(plot.decode()?);
        }
        Ok(Capture {
            stdout: self.stdout,
            stderr: self.stderr,
            plots,
        })
    }
}

/// Parse one NDJSON line into a [`ResponseFrame`].
///
/// # Errors
///
/// Returns [`AppError::Engine`] if the line is not valid JSON or lacks a
/// numeric `id`.
pub fn parse_response(line: &str) -> Result<ResponseFrame> {
    serde_json::from_str(line).map_err(|e| AppError::Engine(format!("malformed response: {e}")))
}

impl ResponseFrame {
    /// Extract the success payload, mapping an error frame to
    /// [`AppError::Engine`] with the adapter's message.
    ///
    /// Used for every method except `eval`, whose error frames carry
    /// partial output and go through [`ResponseFrame::into_eval_outcome`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] when the frame is an error frame.
    pub fn into_payload(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(AppError::Engine(err.message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }

    /// Interpret the frame as the reply to an `eval` request.
    ///
    /// Error frames become [`EvalOutcome::Failed`] so the output captured
    /// before the failure survives; success frames decode into a
    /// [`Capture`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Engine`] if the success payload cannot be
    /// decoded.
    pub fn into_eval_outcome(self) -> Result<EvalOutcome> {
        if let Some(err) = self.error {
            return Ok(EvalOutcome::Failed(EvalFailure {
                message: err.message,
                stdout: err.stdout,
                stderr: err.stderr,
            }));
        }
        let payload: EvalPayload = match self.result {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| AppError::Engine(format!("malformed eval payload: {e}")))?,
            None => EvalPayload::default(),
        };
        Ok(EvalOutcome::Complete(payload.into_capture()?))
    }
}
