use std::path::PathBuf;
use std::time::Duration;

use serial_test::serial;
use stat_lab::{
    config::{GlobalConfig, DATASET_SOURCE_ENV},
    AppError,
};

fn sample_toml() -> String {
    let digest = "a".repeat(64);
    format!(
        r#"
lessons_dir = "content/lessons"

[engine]
command = "webr-adapter"
args = ["--quiet"]
packages = ["dplyr"]
boot_timeout_seconds = 30
install_timeout_seconds = 90

[dataset]
source = "https://example.com/nfl_schedules.csv"
engine_path = "data/games.csv"
sha256 = "{digest}"
"#
    )
}

fn minimal_toml() -> &'static str {
    r#"
[engine]
command = "webr-adapter"

[dataset]
source = "https://example.com/nfl_schedules.csv"
"#
}

fn config_err(raw: &str) -> String {
    match GlobalConfig::from_toml_str(raw) {
        Err(AppError::Config(msg)) => msg,
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
fn full_config_parses_every_field() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("parse");

    assert_eq!(config.lessons_dir, PathBuf::from("content/lessons"));
    assert_eq!(config.engine.command, "webr-adapter");
    assert_eq!(config.engine.args, vec!["--quiet".to_string()]);
    assert_eq!(config.engine.packages, vec!["dplyr".to_string()]);
    assert_eq!(config.engine.boot_timeout_seconds, 30);
    assert_eq!(config.engine.install_timeout_seconds, 90);
    assert_eq!(config.dataset.source, "https://example.com/nfl_schedules.csv");
    assert_eq!(config.dataset.engine_path, "data/games.csv");
    assert_eq!(config.dataset.sha256.as_deref(), Some("a".repeat(64).as_str()));
}

#[test]
fn minimal_config_applies_defaults() {
    let config = GlobalConfig::from_toml_str(minimal_toml()).expect("parse");

    assert_eq!(config.lessons_dir, PathBuf::from("lessons"));
    assert!(config.engine.args.is_empty());
    assert_eq!(
        config.engine.packages,
        vec!["dplyr".to_string(), "readr".to_string(), "ggplot2".to_string()]
    );
    assert_eq!(config.engine.boot_timeout_seconds, 60);
    assert_eq!(config.engine.install_timeout_seconds, 120);
    assert_eq!(config.dataset.engine_path, "data/nfl_schedules.csv");
    assert_eq!(config.dataset.sha256, None);
}

#[test]
fn timeout_accessors_are_durations() {
    let config = GlobalConfig::from_toml_str(&sample_toml()).expect("parse");

    assert_eq!(config.engine.boot_timeout(), Duration::from_secs(30));
    assert_eq!(config.engine.install_timeout(), Duration::from_secs(90));
}

#[test]
fn empty_engine_command_is_rejected() {
    let raw = minimal_toml().replace("\"webr-adapter\"", "\"  \"");
    assert_eq!(config_err(&raw), "engine.command must not be empty");
}

#[test]
fn zero_boot_timeout_is_rejected() {
    let raw = sample_toml().replace("boot_timeout_seconds = 30", "boot_timeout_seconds = 0");
    assert_eq!(
        config_err(&raw),
        "engine.boot_timeout_seconds must be greater than zero"
    );
}

#[test]
fn zero_install_timeout_is_rejected() {
    let raw =
        sample_toml().replace("install_timeout_seconds = 90", "install_timeout_seconds = 0");
    assert_eq!(
        config_err(&raw),
        "engine.install_timeout_seconds must be greater than zero"
    );
}

#[test]
fn blank_package_name_is_rejected() {
    let raw = sample_toml().replace("packages = [\"dplyr\"]", "packages = [\"dplyr\", \" \"]");
    assert_eq!(config_err(&raw), "engine.packages must not contain empty names");
}

#[test]
fn empty_dataset_source_is_rejected() {
    let raw = minimal_toml().replace("https://example.com/nfl_schedules.csv", "  ");
    assert_eq!(config_err(&raw), "dataset.source must not be empty");
}

#[test]
fn engine_path_must_name_a_file() {
    let raw = sample_toml().replace("data/games.csv", "data/");
    assert_eq!(config_err(&raw), "dataset.engine_path must name a file");
}

#[test]
fn short_sha256_digest_is_rejected() {
    let raw = sample_toml().replace(&"a".repeat(64), "abc123");
    assert_eq!(
        config_err(&raw),
        "dataset.sha256 must be a 64-character hex digest"
    );
}

#[test]
fn non_hex_sha256_digest_is_rejected() {
    let raw = sample_toml().replace(&"a".repeat(64), &"z".repeat(64));
    assert_eq!(
        config_err(&raw),
        "dataset.sha256 must be a 64-character hex digest"
    );
}

#[test]
fn malformed_toml_maps_to_config_error() {
    let msg = config_err("this is not toml ===");
    assert!(msg.starts_with("invalid config:"), "got: {msg}");
}

#[test]
fn missing_engine_table_maps_to_config_error() {
    let msg = config_err("[dataset]\nsource = \"x.csv\"\n");
    assert!(msg.starts_with("invalid config:"), "got: {msg}");
}

#[test]
fn load_from_path_reads_a_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, sample_toml()).expect("write config");

    let config = GlobalConfig::load_from_path(&path).expect("load");
    assert_eq!(config.engine.command, "webr-adapter");
}

#[test]
fn load_from_path_missing_file_is_a_config_error() {
    let err = GlobalConfig::load_from_path("/nonexistent/stat-lab.toml")
        .expect_err("missing file rejected");
    match err {
        AppError::Config(msg) => assert!(msg.starts_with("failed to read config:"), "got: {msg}"),
        other => panic!("expected config error, got {other:?}"),
    }
}

#[test]
#[serial]
fn env_override_replaces_the_dataset_source() {
    std::env::set_var(DATASET_SOURCE_ENV, "/srv/mirror/nfl.csv");
    let mut config = GlobalConfig::from_toml_str(minimal_toml()).expect("parse");
    config.apply_env_overrides();
    std::env::remove_var(DATASET_SOURCE_ENV);

    assert_eq!(config.dataset.source, "/srv/mirror/nfl.csv");
}

#[test]
#[serial]
fn empty_env_override_is_ignored() {
    std::env::set_var(DATASET_SOURCE_ENV, "   ");
    let mut config = GlobalConfig::from_toml_str(minimal_toml()).expect("parse");
    config.apply_env_overrides();
    std::env::remove_var(DATASET_SOURCE_ENV);

    assert_eq!(config.dataset.source, "https://example.com/nfl_schedules.csv");
}

#[test]
#[serial]
fn absent_env_override_leaves_the_source_untouched() {
    std::env::remove_var(DATASET_SOURCE_ENV);
    let mut config = GlobalConfig::from_toml_str(minimal_toml()).expect("parse");
    config.apply_env_overrides();

    assert_eq!(config.dataset.source, "https://example.com/nfl_schedules.csv");
}
