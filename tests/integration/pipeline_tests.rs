//! Pipeline tests: scope lifecycle and result shaping for single runs.

use bytes::Bytes;
use chrono::Utc;
use stat_lab::engine::{Capture, EvalFailure, EvalOutcome};
use stat_lab::exec::pipeline;
use stat_lab::models::result::RenderedPlot;
use stat_lab::session::SessionHandle;
use stat_lab::AppError;

use super::test_helpers::StubEngine;

fn handle_for(engine: StubEngine) -> SessionHandle {
    let now = Utc::now();
    SessionHandle {
        id: "test-session".into(),
        engine: Box::new(engine),
        created_at: now,
        ready_at: now,
    }
}

#[tokio::test]
async fn complete_evaluation_shapes_all_channels() {
    let engine = StubEngine::ready();
    let log = engine.log();
    let plot = RenderedPlot {
        width: 504,
        height: 504,
        png: Bytes::from_static(b"png-bytes"),
    };
    engine.push_eval(Ok(EvalOutcome::Complete(Capture {
        stdout: vec!["[1] 4".into()],
        stderr: vec!["note: something".into()],
        plots: vec![plot.clone()],
    })));
    let session = handle_for(engine);

    let result = pipeline::run(&session, "2 + 2").await;

    assert!(result.is_ok());
    assert_eq!(result.stdout, vec!["[1] 4".to_string()]);
    assert_eq!(result.stderr, vec!["note: something".to_string()]);
    assert_eq!(result.plots, vec![plot]);
    assert_eq!(log.eval_transcript(), vec!["2 + 2".to_string()]);
    assert_eq!(log.scopes_opened(), 1);
    assert_eq!(log.scopes_disposed(), 1);
}

#[tokio::test]
async fn failed_evaluation_keeps_partial_output_and_drops_plots() {
    let engine = StubEngine::ready();
    let log = engine.log();
    engine.push_eval(Ok(EvalOutcome::Failed(EvalFailure {
        message: "unexpected symbol in \"prnit(\"".into(),
        stdout: vec!["printed first".into()],
        stderr: vec!["Warning message:".into()],
    })));
    let session = handle_for(engine);

    let result = pipeline::run(&session, "prnit(1)").await;

    assert_eq!(result.error.as_deref(), Some("unexpected symbol in \"prnit(\""));
    assert_eq!(result.stdout, vec!["printed first".to_string()]);
    assert_eq!(result.stderr, vec!["Warning message:".to_string()]);
    assert!(result.plots.is_empty());
    assert_eq!(log.scopes_disposed(), 1, "scope disposed on failure too");
}

#[tokio::test]
async fn transport_error_still_disposes_the_scope() {
    let engine = StubEngine::ready();
    let log = engine.log();
    engine.push_eval(Err(AppError::Engine("engine exited before responding".into())));
    let session = handle_for(engine);

    let result = pipeline::run(&session, "quit()").await;

    assert_eq!(
        result.error.as_deref(),
        Some("engine: engine exited before responding")
    );
    assert!(result.stdout.is_empty());
    assert_eq!(log.scopes_opened(), 1);
    assert_eq!(log.scopes_disposed(), 1);
}

#[tokio::test]
async fn open_scope_failure_settles_without_evaluating() {
    let engine =
        StubEngine::with_open_scope_error(AppError::Engine("adapter writer unavailable".into()));
    let log = engine.log();
    let session = handle_for(engine);

    let result = pipeline::run(&session, "1 + 1").await;

    assert_eq!(
        result.error.as_deref(),
        Some("engine: adapter writer unavailable")
    );
    assert!(log.eval_transcript().is_empty(), "nothing was evaluated");
    assert_eq!(log.scopes_disposed(), 0);
}

#[tokio::test]
async fn each_run_gets_its_own_scope() {
    let engine = StubEngine::ready();
    let log = engine.log();
    let session = handle_for(engine);

    pipeline::run(&session, "a <- 1").await;
    pipeline::run(&session, "a + 1").await;

    assert_eq!(log.scopes_opened(), 2);
    assert_eq!(log.scopes_disposed(), 2);
    assert_eq!(
        log.eval_transcript(),
        vec!["a <- 1".to_string(), "a + 1".to_string()]
    );
}
