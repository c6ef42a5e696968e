//! Spawns the external engine adapter process.
//!
//! The adapter starts inside the engine workspace with a scrubbed
//! environment and fully piped stdio. Its first stdout line is the ready
//! signal: the protocol handshake begins only after that line has been
//! seen, and a silent adapter is killed once the startup window closes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::info;

use crate::{AppError, Result};

/// Environment variables the adapter process inherits from the host.
///
/// The child is built from `env_clear()`, so a variable not listed here,
/// host API tokens in particular, is invisible to the adapter and to any
/// learner code it evaluates.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Locale and temp-dir variables the interpreter consults.
    "LANG",
    "LC_ALL",
    "TZ",
    "TMPDIR",
    // R installation discovery.
    "R_HOME",
    "R_LIBS_USER",
    "R_LIBS_SITE",
    // Windows equivalents of the above.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// How to start one adapter process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Adapter binary (e.g. `stat-lab-r-adapter`, `Rscript`).
    pub command: String,
    /// Arguments passed to the adapter binary.
    pub args: Vec<String>,
    /// Directory the child starts in; staged files and the relative
    /// paths lesson code uses resolve against it.
    pub workspace_root: PathBuf,
    /// Window for the ready signal before the process is killed.
    pub startup_timeout: Duration,
}

/// Stdio of a spawned adapter that has emitted its ready signal.
#[derive(Debug)]
pub struct EngineConnection {
    /// Engine identifier the process was launched for, used in logs.
    pub engine_id: String,
    /// Child handle; `kill_on_drop` reaps it if the connection is dropped.
    pub child: Child,
    /// Adapter stdin, carrying request lines.
    pub stdin: ChildStdin,
    /// Buffered adapter stdout, read line-wise for response frames.
    pub stdout: BufReader<ChildStdout>,
}

/// Start the adapter process and wait for its ready signal.
///
/// The ready signal is the adapter's first stdout line; its content is
/// logged, not interpreted. The `initialize` handshake happens after it,
/// over the returned connection. `STAT_LAB_ENGINE_ID` is set in the
/// child's environment so adapter logs can be correlated with ours.
///
/// # Errors
///
/// - `AppError::Engine("failed to spawn engine adapter: …")` on an OS
///   spawn failure.
/// - `AppError::Engine("startup timeout …")` when no ready line arrives
///   within the window.
/// - `AppError::Engine("engine adapter exited before ready signal")` on
///   early EOF.
pub async fn spawn_engine(config: &SpawnConfig, engine_id: &str) -> Result<EngineConnection> {
    let mut child = adapter_command(config, engine_id)
        .spawn()
        .map_err(|err| AppError::Engine(format!("failed to spawn engine adapter: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Engine("failed to capture adapter stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Engine("failed to capture adapter stdout".into()))?;
    let mut stdout = BufReader::new(stdout);

    if let Err(err) = await_ready_signal(&mut stdout, config.startup_timeout, engine_id).await {
        child.kill().await.ok();
        return Err(err);
    }

    Ok(EngineConnection {
        engine_id: engine_id.to_owned(),
        child,
        stdin,
        stdout,
    })
}

/// Build the adapter command: scrubbed environment, workspace cwd, piped
/// stdio, `kill_on_drop`.
fn adapter_command(config: &SpawnConfig, engine_id: &str) -> Command {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    cmd.env_clear();
    for &key in ALLOWED_ENV_VARS {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }
    cmd.env("STAT_LAB_ENGINE_ID", engine_id);

    cmd.current_dir(&config.workspace_root)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Wait up to `timeout` for the adapter's first stdout line.
async fn await_ready_signal(
    stdout: &mut BufReader<ChildStdout>,
    timeout: Duration,
    engine_id: &str,
) -> Result<()> {
    let mut line = String::new();
    let read = tokio::time::timeout(timeout, stdout.read_line(&mut line))
        .await
        .map_err(|_| {
            AppError::Engine(format!(
                "startup timeout: adapter did not emit ready signal within {timeout:?}"
            ))
        })?
        .map_err(|err| AppError::Engine(format!("failed to read adapter ready signal: {err}")))?;

    // Zero bytes read is EOF: the adapter died without a ready line.
    if read == 0 {
        return Err(AppError::Engine(
            "engine adapter exited before ready signal".into(),
        ));
    }

    info!(
        engine_id,
        ready_line = line.trim(),
        "engine adapter emitted ready signal"
    );
    Ok(())
}
