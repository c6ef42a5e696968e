//! Shared scripted engines and launchers for session and execution tests.
//!
//! The doubles implement the engine traits over in-memory scripts so
//! tests can drive every bring-up stage and failure mode without a real
//! adapter process, and assert afterwards on what the engine was asked
//! to do.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use stat_lab::config::GlobalConfig;
use stat_lab::engine::{
    Capture, CaptureOptions, EngineLauncher, EvalOutcome, EvalScope, LanguageEngine,
};
use stat_lab::{AppError, Result};

/// Everything a [`StubEngine`] was asked to do, shared with the test body.
#[derive(Debug, Default)]
pub struct EngineLog {
    /// Package lists passed to `install_packages`, in call order.
    pub installs: Mutex<Vec<Vec<String>>>,
    /// `(path, byte_len)` pairs passed to `write_file`, in call order.
    pub staged_files: Mutex<Vec<(String, usize)>>,
    /// Code strings passed to `eval`, across all scopes, in call order.
    pub evals: Mutex<Vec<String>>,
    /// Number of scopes opened.
    pub scopes_opened: AtomicUsize,
    /// Number of scopes disposed.
    pub scopes_disposed: AtomicUsize,
    /// Number of `shutdown` calls.
    pub shutdowns: AtomicUsize,
}

impl EngineLog {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn scopes_opened(&self) -> usize {
        self.scopes_opened.load(Ordering::SeqCst)
    }

    pub fn scopes_disposed(&self) -> usize {
        self.scopes_disposed.load(Ordering::SeqCst)
    }

    pub fn eval_transcript(&self) -> Vec<String> {
        self.evals.lock().expect("evals lock").clone()
    }
}

/// Scripted [`LanguageEngine`] double.
///
/// Evaluations pop outcomes from a shared script queue; an exhausted
/// queue yields empty successful captures.
pub struct StubEngine {
    log: Arc<EngineLog>,
    install_error: Option<AppError>,
    install_delay: Duration,
    open_scope_error: Option<AppError>,
    eval_delay: Duration,
    eval_script: Arc<Mutex<VecDeque<Result<EvalOutcome>>>>,
}

impl StubEngine {
    /// An engine that accepts everything and evaluates to empty captures.
    pub fn ready() -> Self {
        Self {
            log: Arc::new(EngineLog::default()),
            install_error: None,
            install_delay: Duration::ZERO,
            open_scope_error: None,
            eval_delay: Duration::ZERO,
            eval_script: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Fail `install_packages` with `err`.
    pub fn with_install_error(err: AppError) -> Self {
        Self {
            install_error: Some(err),
            ..Self::ready()
        }
    }

    /// Stall `install_packages` for `delay` before succeeding.
    pub fn with_install_delay(delay: Duration) -> Self {
        Self {
            install_delay: delay,
            ..Self::ready()
        }
    }

    /// Stall every `eval` for `delay` before it settles.
    pub fn with_eval_delay(delay: Duration) -> Self {
        Self {
            eval_delay: delay,
            ..Self::ready()
        }
    }

    /// Fail `open_scope` with `err`.
    pub fn with_open_scope_error(err: AppError) -> Self {
        Self {
            open_scope_error: Some(err),
            ..Self::ready()
        }
    }

    /// Queue the outcome for the next unscripted evaluation.
    pub fn push_eval(&self, outcome: Result<EvalOutcome>) {
        self.eval_script
            .lock()
            .expect("eval script lock")
            .push_back(outcome);
    }

    /// Handle on the engine's log, usable after the engine is consumed.
    pub fn log(&self) -> Arc<EngineLog> {
        Arc::clone(&self.log)
    }
}

impl LanguageEngine for StubEngine {
    fn install_packages(
        &self,
        packages: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let packages = packages.to_vec();
        Box::pin(async move {
            self.log
                .installs
                .lock()
                .expect("installs lock")
                .push(packages);
            if !self.install_delay.is_zero() {
                tokio::time::sleep(self.install_delay).await;
            }
            match &self.install_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        })
    }

    fn write_file(
        &self,
        path: &str,
        bytes: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let path = path.to_owned();
        Box::pin(async move {
            self.log
                .staged_files
                .lock()
                .expect("staged files lock")
                .push((path, bytes.len()));
            Ok(())
        })
    }

    fn open_scope(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EvalScope>>> + Send + '_>> {
        Box::pin(async move {
            if let Some(err) = &self.open_scope_error {
                return Err(err.clone());
            }
            self.log.scopes_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StubScope {
                log: Arc::clone(&self.log),
                eval_delay: self.eval_delay,
                script: Arc::clone(&self.eval_script),
            }) as Box<dyn EvalScope>)
        })
    }

    fn shutdown(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.log.shutdowns.fetch_add(1, Ordering::SeqCst);
        })
    }
}

struct StubScope {
    log: Arc<EngineLog>,
    eval_delay: Duration,
    script: Arc<Mutex<VecDeque<Result<EvalOutcome>>>>,
}

impl EvalScope for StubScope {
    fn eval(
        &mut self,
        code: &str,
        _options: &CaptureOptions,
    ) -> Pin<Box<dyn Future<Output = Result<EvalOutcome>> + Send + '_>> {
        let code = code.to_owned();
        Box::pin(async move {
            self.log.evals.lock().expect("evals lock").push(code);
            if !self.eval_delay.is_zero() {
                tokio::time::sleep(self.eval_delay).await;
            }
            self.script
                .lock()
                .expect("eval script lock")
                .pop_front()
                .unwrap_or(Ok(EvalOutcome::Complete(Capture::default())))
        })
    }

    fn dispose(self: Box<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            self.log.scopes_disposed.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// What the scripted launcher does for one `launch` call.
pub enum LaunchPlan {
    /// Hand out this engine.
    Ready(StubEngine),
    /// Fail the launch with this error.
    Fail(AppError),
}

/// Scripted [`EngineLauncher`]: hands out prepared plans in order and
/// counts launches. An exhausted plan queue yields fresh ready engines.
pub struct StubLauncher {
    plans: Mutex<VecDeque<LaunchPlan>>,
    launches: AtomicUsize,
    delay: Duration,
}

impl StubLauncher {
    /// A launcher that hands out exactly this engine first.
    pub fn single(engine: StubEngine) -> Self {
        Self::sequence(vec![LaunchPlan::Ready(engine)])
    }

    /// A launcher following the given plan sequence.
    pub fn sequence(plans: Vec<LaunchPlan>) -> Self {
        Self {
            plans: Mutex::new(plans.into_iter().collect()),
            launches: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Stall every launch for `delay` before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `launch` calls observed so far.
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl EngineLauncher for StubLauncher {
    fn launch(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn LanguageEngine>>> + Send + '_>> {
        Box::pin(async move {
            self.launches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let plan = self.plans.lock().expect("plans lock").pop_front();
            match plan {
                Some(LaunchPlan::Ready(engine)) => Ok(Box::new(engine) as Box<dyn LanguageEngine>),
                Some(LaunchPlan::Fail(err)) => Err(err),
                None => Ok(Box::new(StubEngine::ready()) as Box<dyn LanguageEngine>),
            }
        })
    }
}

/// Write a small CSV dataset into a fresh temp dir.
///
/// Returns the dir guard (keep it alive) and the file's path as a string.
pub fn temp_dataset() -> (tempfile::TempDir, String) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nfl_schedules.csv");
    std::fs::write(&path, b"season,week,home_team,away_team\n2020,1,KC,HOU\n")
        .expect("write dataset");
    (dir, path.to_str().expect("utf8 path").to_owned())
}

/// Config with one-second stage bounds whose dataset is `dataset_path`.
pub fn test_config(dataset_path: &str) -> GlobalConfig {
    let toml = format!(
        r#"
lessons_dir = "lessons"

[engine]
command = "stub-adapter"
packages = ["dplyr", "readr"]
boot_timeout_seconds = 1
install_timeout_seconds = 1

[dataset]
source = '{dataset_path}'
engine_path = "data/nfl_schedules.csv"
"#
    );
    GlobalConfig::from_toml_str(&toml).expect("valid test config")
}
