#![forbid(unsafe_code)]

//! `stat-lab`: guided statistics lab runner binary.
//!
//! Bootstraps configuration, brings the sandboxed R engine up through the
//! session manager, and runs lesson code headlessly. Content authors use
//! it to validate modules; CI uses it to smoke-check an engine adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use stat_lab::config::GlobalConfig;
use stat_lab::engine::subprocess::SubprocessLauncher;
use stat_lab::exec::orchestrator::Executor;
use stat_lab::lesson;
use stat_lab::lesson::progress::LessonSession;
use stat_lab::models::result::ExecutionResult;
use stat_lab::models::session::SessionState;
use stat_lab::session::manager::SessionManager;
use stat_lab::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "stat-lab", about = "Guided statistics lab runner", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration and lesson catalog, then print a summary.
    Check,

    /// Bring a session up and run one code snippet through the executor.
    Exec {
        /// Code to run.
        #[arg(long, conflicts_with = "file")]
        code: Option<String>,

        /// File whose contents are run instead of `--code`.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Code run silently before the visible snippet.
        #[arg(long)]
        setup: Option<String>,

        /// Directory rendered plots are written into.
        #[arg(long, default_value = "plots")]
        plots_dir: PathBuf,
    },

    /// Run every step solution of one module in order, with step setup code.
    Walk {
        /// Module id to walk (e.g. `module-1`).
        #[arg(long)]
        module: String,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("stat-lab bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.apply_env_overrides();
    info!("configuration loaded");

    match args.command {
        Command::Check => check(&config).await,
        Command::Exec {
            code,
            file,
            setup,
            plots_dir,
        } => {
            let code = resolve_code(code, file)?;
            exec(config, &code, setup.as_deref(), &plots_dir).await
        }
        Command::Walk { module } => walk(config, &module).await,
    }
}

/// Load every lesson module and print a one-line summary per module.
async fn check(config: &GlobalConfig) -> Result<()> {
    let catalog = lesson::load_catalog(&config.lessons_dir).await?;

    println!(
        "config ok: engine `{}`, dataset `{}`",
        config.engine.command, config.dataset.source
    );
    for module in &catalog {
        println!(
            "  {}: {} ({} steps)",
            module.id,
            module.title,
            module.steps.len()
        );
    }
    Ok(())
}

/// Run one snippet against a fresh session and mirror its output channels.
async fn exec(
    config: GlobalConfig,
    code: &str,
    setup: Option<&str>,
    plots_dir: &Path,
) -> Result<()> {
    let (manager, executor) = build_stack(config);
    let status_task = tokio::spawn(log_status_transitions(manager.subscribe()));

    manager.initialize().await?;
    let _ = status_task.await;

    let result = executor.execute(code, setup).await;
    render_result(&result);
    write_plots(&result, plots_dir).await?;

    manager.reset().await;

    if let Some(cause) = &result.error {
        eprintln!("Error: {cause}");
        std::process::exit(1);
    }
    Ok(())
}

/// Run every step solution of a module in curriculum order, driving the
/// progression machine as a learner who completes each step would.
async fn walk(config: GlobalConfig, module_id: &str) -> Result<()> {
    let catalog = lesson::load_catalog(&config.lessons_dir).await?;
    let module = lesson::find_module(&catalog, module_id)
        .ok_or_else(|| AppError::Lesson(format!("unknown module '{module_id}'")))?;
    let mut progress = LessonSession::new(Arc::clone(module))?;

    let (manager, executor) = build_stack(config);
    let status_task = tokio::spawn(log_status_transitions(manager.subscribe()));
    manager.initialize().await?;
    let _ = status_task.await;

    let mut failed = false;
    loop {
        let step = progress.current_step();
        let step_id = step.id.clone();
        let title = step.title.clone();
        let solution = step.solution_code.clone();
        let setup = step.setup_code.clone();
        info!(step = %step_id, %title, "walking step");

        let result = executor.execute(&solution, setup.as_deref()).await;
        if let Some(cause) = &result.error {
            error!(step = %step_id, %cause, "step solution failed");
            failed = true;
            break;
        }
        info!(
            step = %step_id,
            stdout_lines = result.stdout.len(),
            plots = result.plots.len(),
            "step solution ran clean"
        );

        progress.start_coding();
        progress.mark_completed();
        if progress.is_last_step() {
            break;
        }
        progress.go_to_next();
    }

    manager.reset().await;

    if failed {
        std::process::exit(1);
    }
    println!(
        "module '{module_id}' ok: {} steps ran clean",
        progress.total_steps()
    );
    Ok(())
}

fn build_stack(config: GlobalConfig) -> (Arc<SessionManager>, Executor) {
    let launcher = Arc::new(SubprocessLauncher::new(config.engine.clone()));
    let manager = Arc::new(SessionManager::new(launcher, config));
    let executor = Executor::new(Arc::clone(&manager));
    (manager, executor)
}

fn resolve_code(code: Option<String>, file: Option<PathBuf>) -> Result<String> {
    match (code, file) {
        (Some(code), _) => Ok(code),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|err| AppError::Config(format!("cannot read {}: {err}", path.display()))),
        (None, None) => Err(AppError::Config(
            "one of --code or --file is required".into(),
        )),
    }
}

/// Log each bring-up status change until the session reaches a terminal
/// state. The task ends on its own once `ready` or `error` is observed.
async fn log_status_transitions(mut rx: watch::Receiver<SessionState>) {
    loop {
        let state = rx.borrow_and_update().clone();
        if let Some(message) = &state.error {
            error!(%message, "session bring-up failed");
            break;
        }
        info!(
            status = ?state.status,
            progress = state.status.progress_percent(),
            "session status"
        );
        if state.status.is_terminal() {
            break;
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn render_result(result: &ExecutionResult) {
    for line in &result.stdout {
        println!("{line}");
    }
    for line in &result.stderr {
        eprintln!("{line}");
    }
}

async fn write_plots(result: &ExecutionResult, dir: &Path) -> Result<()> {
    if result.plots.is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir).await?;
    for (index, plot) in result.plots.iter().enumerate() {
        let path = dir.join(format!("plot-{}.png", index + 1));
        tokio::fs::write(&path, &plot.png).await?;
        info!(path = %path.display(), width = plot.width, height = plot.height, "plot written");
    }
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
