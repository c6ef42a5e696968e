//! Lesson content model: TOML parsing, validation rules, step lookup.

use serde_json::json;
use stat_lab::lesson;
use stat_lab::models::lesson::{LessonModule, LessonStep, Phase};
use stat_lab::AppError;

fn step(id: &str) -> LessonStep {
    LessonStep {
        id: id.into(),
        title: format!("Step {id}"),
        preview_instructions: "preview".into(),
        solution_code: "1 + 1".into(),
        practice_instructions: "practice".into(),
        scaffold_code: "# try".into(),
        setup_code: None,
    }
}

fn module_with(steps: Vec<LessonStep>) -> LessonModule {
    LessonModule {
        id: "module-1".into(),
        title: "Module One".into(),
        description: "d".into(),
        steps,
    }
}

fn lesson_err(module: &LessonModule) -> String {
    match module.validate() {
        Err(AppError::Lesson(msg)) => msg,
        other => panic!("expected lesson error, got {other:?}"),
    }
}

#[test]
fn valid_toml_parses_with_optional_setup() {
    let raw = r##"
id = "m"
title = "Module"
description = "d"

[[steps]]
id = "a"
title = "A"
preview_instructions = "look"
solution_code = "1"
practice_instructions = "do"
scaffold_code = "# a"

[[steps]]
id = "b"
title = "B"
preview_instructions = "look"
solution_code = "2"
practice_instructions = "do"
scaffold_code = "# b"
setup_code = "prep()"
"##;
    let module = lesson::from_toml_str(raw).expect("parses");

    assert_eq!(module.steps.len(), 2);
    assert_eq!(module.steps[0].setup_code, None);
    assert_eq!(module.steps[1].setup_code.as_deref(), Some("prep()"));
}

#[test]
fn malformed_toml_is_a_lesson_error() {
    let err = lesson::from_toml_str("not toml ===").expect_err("rejected");
    match err {
        AppError::Lesson(msg) => assert!(msg.starts_with("invalid lesson toml:"), "got: {msg}"),
        other => panic!("expected lesson error, got {other:?}"),
    }
}

#[test]
fn missing_required_step_field_is_a_lesson_error() {
    let raw = r#"
id = "m"
title = "Module"
description = "d"

[[steps]]
id = "a"
title = "A"
"#;
    let err = lesson::from_toml_str(raw).expect_err("rejected");
    assert!(matches!(err, AppError::Lesson(_)), "got: {err:?}");
}

#[test]
fn empty_module_id_is_rejected() {
    let mut module = module_with(vec![step("a")]);
    module.id = "  ".into();
    assert_eq!(lesson_err(&module), "module id must not be empty");
}

#[test]
fn empty_module_title_is_rejected() {
    let mut module = module_with(vec![step("a")]);
    module.title = String::new();
    assert_eq!(lesson_err(&module), "module 'module-1' has an empty title");
}

#[test]
fn module_without_steps_is_rejected() {
    let module = module_with(Vec::new());
    assert_eq!(lesson_err(&module), "module 'module-1' has no steps");
}

#[test]
fn empty_step_id_is_rejected() {
    let module = module_with(vec![step("a"), step("")]);
    assert_eq!(
        lesson_err(&module),
        "module 'module-1' contains a step with an empty id"
    );
}

#[test]
fn duplicate_step_ids_are_rejected() {
    let module = module_with(vec![step("a"), step("b"), step("a")]);
    assert_eq!(
        lesson_err(&module),
        "module 'module-1' contains duplicate step id 'a'"
    );
}

#[test]
fn step_lookup_finds_by_id() {
    let module = module_with(vec![step("a"), step("b")]);
    assert_eq!(module.step("b").map(|s| s.id.as_str()), Some("b"));
    assert_eq!(module.step("missing"), None);
}

#[test]
fn phase_defaults_to_preview() {
    assert_eq!(Phase::default(), Phase::Preview);
}

#[test]
fn phase_serializes_kebab_case() {
    assert_eq!(serde_json::to_value(Phase::Preview).expect("json"), json!("preview"));
    assert_eq!(serde_json::to_value(Phase::Practice).expect("json"), json!("practice"));
}
