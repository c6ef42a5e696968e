//! Session lifecycle manager: staged bring-up, single-flight joins, reset.
//!
//! The manager owns at most one live session and a watchable status cell
//! that frontends key loading screens on. Bring-up walks the staged flow
//! `Loading → InstallingPackages → LoadingData → Ready`, publishing each
//! stage before it starts.
//!
//! Bring-up is single-flight: concurrent [`SessionManager::initialize`]
//! calls join the attempt already underway instead of booting a second
//! engine, and a failed attempt stays joinable until a reset clears it.
//! [`SessionManager::reset`] bumps an epoch counter; an attempt that
//! loses the race observes the stale epoch, discards its engine, and
//! never touches the status cell.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{DatasetConfig, EngineConfig, GlobalConfig};
use crate::engine::{EngineLauncher, LanguageEngine};
use crate::models::session::{SessionState, SessionStatus};
use crate::session::{dataset, SessionHandle};
use crate::{AppError, Result};

/// Outcome carried by the shared bring-up future.
///
/// `std::result::Result` rather than [`crate::Result`] because
/// [`Shared`] requires a `Clone` output.
type InitResult = std::result::Result<Arc<SessionHandle>, AppError>;

/// One in-flight bring-up attempt, joinable by any number of callers.
type InitFuture = Shared<BoxFuture<'static, InitResult>>;

/// State behind the manager's mutex.
struct ManagerInner {
    /// Bumped by every reset; stale attempts compare against it.
    epoch: u64,
    /// Bring-up attempt currently in flight, if any.
    attempt: Option<InitFuture>,
    /// The ready session, if one exists.
    current: Option<Arc<SessionHandle>>,
}

/// Owns the one live session and its bring-up state machine.
pub struct SessionManager {
    inner: Arc<Mutex<ManagerInner>>,
    status_tx: watch::Sender<SessionState>,
    launcher: Arc<dyn EngineLauncher>,
    config: GlobalConfig,
}

impl SessionManager {
    /// Create a manager with no session and an `Uninitialized` status cell.
    #[must_use]
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: GlobalConfig) -> Self {
        let (status_tx, _status_rx) = watch::channel(SessionState::idle());
        Self {
            inner: Arc::new(Mutex::new(ManagerInner {
                epoch: 0,
                attempt: None,
                current: None,
            })),
            status_tx,
            launcher,
            config,
        }
    }

    /// Bring the session up, or join the attempt already doing so.
    ///
    /// Returns the existing session immediately when one is ready. A
    /// failed attempt stays settled: calling again without a reset
    /// re-joins it and observes the same error rather than booting a
    /// fresh engine. Recovery is an explicit [`SessionManager::reset`]
    /// followed by a new `initialize`.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when the boot or package-install stage
    ///   exceeds its configured window.
    /// - [`AppError::Session`] when a reset supersedes the attempt.
    /// - Any engine or dataset error from the failing stage.
    pub async fn initialize(&self) -> Result<Arc<SessionHandle>> {
        let attempt = {
            let mut inner = self.inner.lock().await;
            if let Some(ref handle) = inner.current {
                debug!(session_id = handle.id.as_str(), "session already ready");
                return Ok(Arc::clone(handle));
            }
            if let Some(ref attempt) = inner.attempt {
                debug!("joining existing bring-up attempt");
                attempt.clone()
            } else {
                let attempt = self.spawn_attempt(inner.epoch);
                inner.attempt = Some(attempt.clone());
                attempt
            }
        };

        attempt.await
    }

    /// Tear the session down and return the status cell to `Uninitialized`.
    ///
    /// Safe to call at any time: with no session it only rewrites the
    /// status cell, and with an attempt in flight it supersedes the
    /// attempt, whose eventual engine is discarded.
    pub async fn reset(&self) {
        let previous = {
            let mut inner = self.inner.lock().await;
            inner.epoch += 1;
            inner.attempt = None;
            let previous = inner.current.take();
            self.status_tx.send_replace(SessionState::idle());
            previous
        };

        if let Some(handle) = previous {
            info!(session_id = handle.id.as_str(), "tearing down session");
            handle.engine.shutdown().await;
        }
        info!("session reset to uninitialized");
    }

    /// The ready session, if one exists.
    pub async fn current(&self) -> Option<Arc<SessionHandle>> {
        self.inner.lock().await.current.clone()
    }

    /// Whether a session is ready right now.
    pub async fn is_initialized(&self) -> bool {
        self.inner.lock().await.current.is_some()
    }

    /// Subscribe to status cell updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.status_tx.subscribe()
    }

    /// Snapshot of the current status cell.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.status_tx.borrow().clone()
    }

    /// Build the shared bring-up future for `epoch` and detach a driver
    /// task so the attempt completes even if every caller gives up.
    fn spawn_attempt(&self, epoch: u64) -> InitFuture {
        let launcher = Arc::clone(&self.launcher);
        let engine_config = self.config.engine.clone();
        let dataset_config = self.config.dataset.clone();
        let inner = Arc::clone(&self.inner);
        let status_tx = self.status_tx.clone();

        let attempt = async move {
            let started_at = Utc::now();
            let session_id = Uuid::new_v4().to_string();
            info!(session_id, "session bring-up started");

            let staged = run_stages(
                launcher.as_ref(),
                &engine_config,
                &dataset_config,
                &inner,
                &status_tx,
                epoch,
                &session_id,
            )
            .await;

            match staged {
                Ok(engine) => {
                    let handle = Arc::new(SessionHandle {
                        id: session_id.clone(),
                        engine,
                        created_at: started_at,
                        ready_at: Utc::now(),
                    });

                    let mut guard = inner.lock().await;
                    if guard.epoch != epoch {
                        drop(guard);
                        info!(session_id, "bring-up superseded by reset, discarding engine");
                        handle.engine.shutdown().await;
                        return Err(superseded());
                    }
                    guard.current = Some(Arc::clone(&handle));
                    guard.attempt = None;
                    status_tx.send_replace(SessionState::at(SessionStatus::Ready));
                    drop(guard);

                    info!(session_id, "session ready");
                    Ok(handle)
                }
                Err(err) => {
                    // The settled attempt stays remembered: initialize
                    // without an intervening reset re-joins it and observes
                    // this same error instead of silently retrying.
                    let guard = inner.lock().await;
                    if guard.epoch == epoch {
                        status_tx.send_replace(SessionState::failed(err.to_string()));
                    }
                    drop(guard);

                    warn!(session_id, error = %err, "session bring-up failed");
                    Err(err)
                }
            }
        };

        let shared = attempt.boxed().shared();
        tokio::spawn({
            let attempt = shared.clone();
            async move {
                let _ = attempt.await;
            }
        });
        shared
    }
}

/// Walk the bring-up stages, returning the fully provisioned engine.
///
/// Publishes each stage's status before starting it; a stale epoch at any
/// publish point aborts the attempt (and shuts down the engine when one
/// is already live).
async fn run_stages(
    launcher: &dyn EngineLauncher,
    engine_config: &EngineConfig,
    dataset_config: &DatasetConfig,
    inner: &Mutex<ManagerInner>,
    status_tx: &watch::Sender<SessionState>,
    epoch: u64,
    session_id: &str,
) -> Result<Box<dyn LanguageEngine>> {
    // Stage 1: boot the engine.
    if !publish_if_current(inner, status_tx, epoch, SessionState::at(SessionStatus::Loading)).await
    {
        return Err(superseded());
    }
    let boot_timeout = engine_config.boot_timeout();
    let engine = match tokio::time::timeout(boot_timeout, launcher.launch()).await {
        Ok(Ok(engine)) => engine,
        Ok(Err(err)) => return Err(err),
        Err(_) => {
            return Err(AppError::Timeout(format!(
                "engine boot timed out after {boot_timeout:?}"
            )));
        }
    };
    debug!(session_id, "engine booted");

    // Stage 2: provision packages.
    if !publish_if_current(
        inner,
        status_tx,
        epoch,
        SessionState::at(SessionStatus::InstallingPackages),
    )
    .await
    {
        engine.shutdown().await;
        return Err(superseded());
    }
    let install_timeout = engine_config.install_timeout();
    match tokio::time::timeout(
        install_timeout,
        engine.install_packages(&engine_config.packages),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            engine.shutdown().await;
            return Err(err);
        }
        Err(_) => {
            engine.shutdown().await;
            return Err(AppError::Timeout(format!(
                "package install timed out after {install_timeout:?}"
            )));
        }
    }
    debug!(session_id, "packages provisioned");

    // Stage 3: stage the lesson dataset.
    if !publish_if_current(
        inner,
        status_tx,
        epoch,
        SessionState::at(SessionStatus::LoadingData),
    )
    .await
    {
        engine.shutdown().await;
        return Err(superseded());
    }
    if let Err(err) = dataset::stage(engine.as_ref(), dataset_config).await {
        engine.shutdown().await;
        return Err(err);
    }
    debug!(session_id, "dataset staged");

    Ok(engine)
}

/// Publish `state` to the status cell unless `epoch` is stale.
///
/// Returns `false` when a reset has superseded the attempt, in which case
/// the cell is left untouched.
async fn publish_if_current(
    inner: &Mutex<ManagerInner>,
    status_tx: &watch::Sender<SessionState>,
    epoch: u64,
    state: SessionState,
) -> bool {
    let guard = inner.lock().await;
    if guard.epoch != epoch {
        return false;
    }
    status_tx.send_replace(state);
    true
}

/// Error observed by awaiters of an attempt a reset superseded.
fn superseded() -> AppError {
    AppError::Session("session reset during initialization".into())
}
