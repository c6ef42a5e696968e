//! Subprocess-backed [`LanguageEngine`] implementation.
//!
//! Owns one external R adapter process and speaks the NDJSON protocol
//! defined in [`protocol`](crate::engine::protocol) over its stdio:
//!
//! - A **writer task** drains a tokio [`mpsc`] channel of outbound
//!   requests, serialises each to a single JSON line, and writes it to
//!   the adapter's stdin.
//! - A **reader task** frames the adapter's stdout with
//!   [`EngineCodec`] and routes each response frame to the oneshot slot
//!   registered under its correlation id.
//!
//! The engine also owns a private temporary workspace directory. The
//! adapter starts with that directory as its working directory, so
//! files staged via [`LanguageEngine::write_file`] are visible to
//! evaluated code under relative paths.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::codec::EngineCodec;
use crate::engine::protocol::{
    self, parse_response, ResponseFrame, ScopeOpened,
};
use crate::engine::spawner::{spawn_engine, EngineConnection, SpawnConfig};
use crate::engine::{
    CaptureOptions, EngineLauncher, EvalOutcome, EvalScope, LanguageEngine,
};
use crate::{AppError, Result};

/// Outbound request queue depth between callers and the writer task.
const OUTBOUND_QUEUE: usize = 64;

/// How long shutdown waits for the adapter to acknowledge before the
/// process is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ── Shared request machinery ─────────────────────────────────────────────────

/// State shared between the engine handle, its scopes, and the reader task.
struct EngineShared {
    /// Engine identifier used in logs.
    engine_id: String,
    /// Sender feeding the writer task.
    msg_tx: mpsc::Sender<Value>,
    /// Oneshot slots awaiting a response frame, keyed by correlation id.
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseFrame>>>>,
    /// Next correlation id.
    next_id: AtomicU64,
}

impl EngineShared {
    /// Send one request and await its correlated response frame.
    ///
    /// `build` receives the allocated correlation id and produces the
    /// outbound message.
    async fn request<F>(&self, build: F) -> Result<ResponseFrame>
    where
        F: FnOnce(u64) -> Result<Value>,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let msg = build(id)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.msg_tx.send(msg).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(AppError::Engine("adapter writer unavailable".into()));
        }

        // The reader task drops the slot if the stream dies, which
        // surfaces here as a closed channel.
        rx.await
            .map_err(|_| AppError::Engine("engine exited before responding".into()))
    }
}

// ── Engine handle ────────────────────────────────────────────────────────────

/// A live engine backed by an external adapter process.
///
/// Created by [`SubprocessLauncher::launch`]. Dropping the engine kills
/// the child via `kill_on_drop`; prefer [`LanguageEngine::shutdown`] for
/// orderly teardown.
pub struct SubprocessEngine {
    shared: Arc<EngineShared>,
    /// Private workspace; removed from disk when the engine is dropped.
    workspace: TempDir,
    /// Cancels the reader and writer tasks.
    cancel: CancellationToken,
    /// Child handle, kept so shutdown can kill the process.
    child: Mutex<Child>,
}

impl SubprocessEngine {
    /// Root of the engine's private workspace directory.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        self.workspace.path()
    }
}

impl LanguageEngine for SubprocessEngine {
    fn install_packages(
        &self,
        packages: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let packages = packages.to_vec();
        Box::pin(async move {
            debug!(
                engine_id = self.shared.engine_id.as_str(),
                count = packages.len(),
                "installing packages"
            );
            let frame = self
                .shared
                .request(|id| Ok(protocol::install_request(id, &packages)))
                .await?;
            frame.into_payload()?;
            Ok(())
        })
    }

    fn write_file(
        &self,
        path: &str,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let path = path.to_owned();
        Box::pin(async move {
            let dest = self.resolve_workspace_path(&path)?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, &bytes).await?;
            debug!(
                engine_id = self.shared.engine_id.as_str(),
                path = path.as_str(),
                bytes = bytes.len(),
                "staged file into engine workspace"
            );
            Ok(())
        })
    }

    fn open_scope(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EvalScope>>> + Send + '_>> {
        Box::pin(async move {
            let frame = self
                .shared
                .request(|id| Ok(protocol::open_scope_request(id)))
                .await?;
            let payload = frame.into_payload()?;
            let opened: ScopeOpened = serde_json::from_value(payload)
                .map_err(|e| AppError::Engine(format!("malformed scope payload: {e}")))?;
            debug!(
                engine_id = self.shared.engine_id.as_str(),
                scope = opened.scope,
                "opened evaluation scope"
            );
            Ok(Box::new(SubprocessScope {
                shared: Arc::clone(&self.shared),
                scope: opened.scope,
            }) as Box<dyn EvalScope>)
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let engine_id = self.shared.engine_id.clone();

            // Ask politely first; the adapter flushes and exits on its own.
            let ack = tokio::time::timeout(
                SHUTDOWN_GRACE,
                self.shared.request(|id| Ok(protocol::shutdown_request(id))),
            )
            .await;
            match ack {
                Ok(Ok(_)) => debug!(engine_id, "adapter acknowledged shutdown"),
                Ok(Err(e)) => debug!(engine_id, error = %e, "shutdown request failed"),
                Err(_) => debug!(engine_id, "no shutdown acknowledgement within grace period"),
            }

            self.cancel.cancel();
            self.child.lock().await.kill().await.ok();
            info!(engine_id, "engine adapter stopped");
        })
    }
}

impl SubprocessEngine {
    /// Resolve a workspace-relative path, rejecting anything that would
    /// escape the workspace root.
    fn resolve_workspace_path(&self, path: &str) -> Result<PathBuf> {
        // A leading `/` names the workspace root, mirroring how lesson
        // code sees the workspace as its filesystem root.
        let rel = Path::new(path.trim_start_matches('/'));
        let escapes = rel.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(AppError::Engine(format!("path escapes workspace: {path}")));
        }
        Ok(self.workspace.path().join(rel))
    }
}

// ── Evaluation scope ─────────────────────────────────────────────────────────

/// One adapter-side evaluation scope.
struct SubprocessScope {
    shared: Arc<EngineShared>,
    /// Adapter-assigned scope identifier.
    scope: u64,
}

impl EvalScope for SubprocessScope {
    fn eval(
        &mut self,
        code: &str,
        options: &CaptureOptions,
    ) -> Pin<Box<dyn Future<Output = Result<EvalOutcome>> + Send + '_>> {
        let code = code.to_owned();
        let options = options.clone();
        Box::pin(async move {
            let frame = self
                .shared
                .request(|id| protocol::eval_request(id, self.scope, &code, &options))
                .await?;
            frame.into_eval_outcome()
        })
    }

    fn dispose(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let result = self
                .shared
                .request(|id| Ok(protocol::close_scope_request(id, self.scope)))
                .await
                .and_then(ResponseFrame::into_payload);
            match result {
                Ok(_) => debug!(
                    engine_id = self.shared.engine_id.as_str(),
                    scope = self.scope,
                    "disposed evaluation scope"
                ),
                Err(e) => warn!(
                    engine_id = self.shared.engine_id.as_str(),
                    scope = self.scope,
                    error = %e,
                    "failed to dispose evaluation scope"
                ),
            }
        })
    }
}

// ── Launcher ─────────────────────────────────────────────────────────────────

/// Launches [`SubprocessEngine`]s from an [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    config: EngineConfig,
}

impl SubprocessLauncher {
    /// Create a launcher for the given engine configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineLauncher for SubprocessLauncher {
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn LanguageEngine>>> + Send + '_>> {
        Box::pin(async move {
            let engine_id = uuid::Uuid::new_v4().to_string();

            let workspace = tempfile::Builder::new()
                .prefix("stat-lab-engine-")
                .tempdir()
                .map_err(|e| AppError::Io(format!("failed to create engine workspace: {e}")))?;

            let spawn_config = SpawnConfig {
                command: self.config.command.clone(),
                args: self.config.args.clone(),
                workspace_root: workspace.path().to_path_buf(),
                startup_timeout: self.config.boot_timeout(),
            };

            let mut conn = spawn_engine(&spawn_config, &engine_id).await?;
            handshake(&mut conn, self.config.boot_timeout()).await?;

            let engine = start_engine(conn, workspace);
            info!(engine_id, "engine adapter ready");
            Ok(Box::new(engine) as Box<dyn LanguageEngine>)
        })
    }
}

/// Wire a handshaken connection into a running [`SubprocessEngine`].
fn start_engine(conn: EngineConnection, workspace: TempDir) -> SubprocessEngine {
    let EngineConnection {
        engine_id,
        child,
        stdin,
        stdout,
    } = conn;

    let (msg_tx, msg_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let pending = Arc::new(Mutex::new(HashMap::new()));
    let cancel = CancellationToken::new();

    tokio::spawn(run_writer(
        engine_id.clone(),
        stdin,
        msg_rx,
        cancel.clone(),
    ));
    tokio::spawn(run_reader(
        engine_id.clone(),
        stdout,
        Arc::clone(&pending),
        cancel.clone(),
    ));

    SubprocessEngine {
        shared: Arc::new(EngineShared {
            engine_id,
            msg_tx,
            pending,
            next_id: AtomicU64::new(1),
        }),
        workspace,
        cancel,
        child: Mutex::new(child),
    }
}

// ── Handshake ────────────────────────────────────────────────────────────────

/// Correlation id used for the initialize exchange.
const INIT_ID: u64 = 0;

/// Perform the `initialize` exchange over the raw connection.
///
/// Runs before the reader and writer tasks start, so it reads the
/// adapter's stdout directly. Non-JSON lines (interpreter banners) are
/// skipped.
///
/// # Errors
///
/// - `AppError::Engine("handshake timeout …")` when no reply arrives
///   within `timeout`.
/// - `AppError::Engine("adapter exited during handshake")` on EOF.
/// - `AppError::Engine(…)` when the adapter answers with an error frame.
async fn handshake(conn: &mut EngineConnection, timeout: Duration) -> Result<()> {
    let msg = protocol::initialize_request(INIT_ID);
    write_json_line(&mut conn.stdin, &msg).await.map_err(|e| {
        AppError::Engine(format!(
            "failed to send initialize to engine {}: {e}",
            conn.engine_id
        ))
    })?;
    debug!(engine_id = conn.engine_id.as_str(), "handshake: initialize sent");

    let frame = wait_for_frame(&mut conn.stdout, &conn.engine_id, INIT_ID, timeout).await?;
    frame.into_payload()?;
    info!(engine_id = conn.engine_id.as_str(), "handshake: initialized received");
    Ok(())
}

/// Read stdout lines until a response frame with `expect_id` arrives or
/// `timeout` elapses.
async fn wait_for_frame(
    stdout: &mut BufReader<ChildStdout>,
    engine_id: &str,
    expect_id: u64,
    timeout: Duration,
) -> Result<ResponseFrame> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(AppError::Engine(format!(
                "handshake timeout: no initialize reply within {timeout:?} for engine {engine_id}"
            )));
        }

        let mut line = String::new();
        let n = tokio::time::timeout(remaining, stdout.read_line(&mut line))
            .await
            .map_err(|_| {
                AppError::Engine(format!(
                    "handshake timeout: no initialize reply within {timeout:?} for engine \
                     {engine_id}"
                ))
            })?
            .map_err(|e| AppError::Engine(format!("handshake io error: {e}")))?;

        if n == 0 {
            return Err(AppError::Engine(format!(
                "adapter exited during handshake for engine {engine_id}"
            )));
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match parse_response(trimmed) {
            Ok(frame) if frame.id == expect_id => return Ok(frame),
            Ok(frame) => {
                debug!(
                    engine_id,
                    id = frame.id,
                    "handshake: skipping unexpected frame before initialize reply"
                );
            }
            Err(e) => {
                debug!(engine_id, error = %e, raw = trimmed, "handshake: non-frame line, skipping");
            }
        }
    }
}

/// Serialise `value` to a compact JSON string, append `\n`, and write it
/// to `stdin`.
async fn write_json_line(stdin: &mut ChildStdin, value: &Value) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("json serialisation failed: {e}"),
        )
    })?;
    bytes.push(b'\n');
    stdin.write_all(&bytes).await
}

// ── Stdio tasks ──────────────────────────────────────────────────────────────

/// Writer task: serialise outbound requests and write them to `stdin`.
///
/// Exits when `cancel` fires or the request channel closes. A failed
/// write stops the task; pending requests then fail through the reader
/// side when the stream dies.
async fn run_writer(
    engine_id: String,
    mut stdin: ChildStdin,
    mut msg_rx: mpsc::Receiver<Value>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(engine_id, "engine writer: cancellation received, stopping");
                break;
            }

            msg = msg_rx.recv() => {
                match msg {
                    None => {
                        debug!(engine_id, "engine writer: request channel closed, stopping");
                        break;
                    }
                    Some(value) => {
                        if let Err(e) = write_json_line(&mut stdin, &value).await {
                            warn!(engine_id, error = %e, "engine writer: write to stdin failed");
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Reader task: frame stdout lines and route response frames to their
/// pending oneshot slots.
///
/// Malformed lines are logged and skipped. EOF or an I/O error fails
/// every pending request by dropping its slot.
async fn run_reader<R>(
    engine_id: String,
    stdout: R,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseFrame>>>>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, EngineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(engine_id, "engine reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        info!(engine_id, "engine reader: adapter stream closed");
                        fail_pending(&pending).await;
                        break;
                    }

                    Some(Err(AppError::Engine(ref msg))) => {
                        // Codec-level error (line too long); skip the line.
                        warn!(
                            engine_id,
                            error = msg.as_str(),
                            "engine reader: codec framing error, skipping"
                        );
                    }

                    Some(Err(e)) => {
                        warn!(engine_id, error = %e, "engine reader: IO error, stopping");
                        fail_pending(&pending).await;
                        break;
                    }

                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match parse_response(&line) {
                            Ok(frame) => route_frame(&engine_id, frame, &pending).await,
                            Err(e) => {
                                warn!(
                                    engine_id,
                                    error = %e,
                                    raw_line = %line,
                                    "engine reader: parse error, skipping line"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Deliver `frame` to the oneshot slot registered under its id.
async fn route_frame(
    engine_id: &str,
    frame: ResponseFrame,
    pending: &Mutex<HashMap<u64, oneshot::Sender<ResponseFrame>>>,
) {
    let slot = pending.lock().await.remove(&frame.id);
    match slot {
        Some(tx) => {
            if tx.send(frame).is_err() {
                debug!(engine_id, "engine reader: caller gave up before response arrived");
            }
        }
        None => {
            debug!(
                engine_id,
                id = frame.id,
                "engine reader: no pending request for response id"
            );
        }
    }
}

/// Drop every pending slot so waiting callers observe engine death.
async fn fail_pending(pending: &Mutex<HashMap<u64, oneshot::Sender<ResponseFrame>>>) {
    pending.lock().await.clear();
}
