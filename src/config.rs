//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Environment variable that overrides `[dataset] source` at startup.
///
/// Lets deployments point a stock config at a mirrored dataset without
/// editing the file.
pub const DATASET_SOURCE_ENV: &str = "STAT_LAB_DATASET_SOURCE";

/// Engine adapter configuration: which process to spawn and how long each
/// bring-up stage may take.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Adapter binary spoken to over stdio (e.g. `webr-adapter`).
    pub command: String,
    /// Default arguments passed to the adapter.
    #[serde(default)]
    pub args: Vec<String>,
    /// Add-on packages provisioned during bring-up.
    #[serde(default = "default_packages")]
    pub packages: Vec<String>,
    /// Engine boot stage bound, in seconds.
    #[serde(default = "default_boot_timeout_seconds")]
    pub boot_timeout_seconds: u64,
    /// Package-provisioning stage bound, in seconds.
    #[serde(default = "default_install_timeout_seconds")]
    pub install_timeout_seconds: u64,
}

impl EngineConfig {
    /// Boot stage bound as a [`Duration`].
    #[must_use]
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_secs(self.boot_timeout_seconds)
    }

    /// Package-provisioning stage bound as a [`Duration`].
    #[must_use]
    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_seconds)
    }
}

fn default_packages() -> Vec<String> {
    vec!["dplyr".into(), "readr".into(), "ggplot2".into()]
}

fn default_boot_timeout_seconds() -> u64 {
    60
}

fn default_install_timeout_seconds() -> u64 {
    120
}

/// Where the lesson dataset comes from and where the engine sees it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DatasetConfig {
    /// `http(s)://` URL or local filesystem path of the dataset file.
    pub source: String,
    /// Path the dataset is written to inside the engine workspace.
    #[serde(default = "default_engine_path")]
    pub engine_path: String,
    /// Optional sha-256 hex digest verified after loading.
    #[serde(default)]
    pub sha256: Option<String>,
}

fn default_engine_path() -> String {
    "data/nfl_schedules.csv".into()
}

fn default_lessons_dir() -> PathBuf {
    PathBuf::from("lessons")
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Directory of authored lesson module TOML files.
    #[serde(default = "default_lessons_dir")]
    pub lessons_dir: PathBuf,
    /// Engine adapter settings.
    pub engine: EngineConfig,
    /// Dataset source and placement.
    pub dataset: DatasetConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides after parsing.
    ///
    /// Currently only [`DATASET_SOURCE_ENV`] is honored; a set but empty
    /// variable is ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(source) = env::var(DATASET_SOURCE_ENV) {
            if source.trim().is_empty() {
                warn!(
                    var = DATASET_SOURCE_ENV,
                    "ignoring empty dataset source override"
                );
            } else {
                warn!(
                    var = DATASET_SOURCE_ENV,
                    source, "dataset source overridden from environment"
                );
                self.dataset.source = source;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.engine.command.trim().is_empty() {
            return Err(AppError::Config("engine.command must not be empty".into()));
        }
        if self.engine.boot_timeout_seconds == 0 {
            return Err(AppError::Config(
                "engine.boot_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.engine.install_timeout_seconds == 0 {
            return Err(AppError::Config(
                "engine.install_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.engine.packages.iter().any(|p| p.trim().is_empty()) {
            return Err(AppError::Config(
                "engine.packages must not contain empty names".into(),
            ));
        }
        if self.dataset.source.trim().is_empty() {
            return Err(AppError::Config("dataset.source must not be empty".into()));
        }
        if self.dataset.engine_path.trim().is_empty() || self.dataset.engine_path.ends_with('/') {
            return Err(AppError::Config(
                "dataset.engine_path must name a file".into(),
            ));
        }
        if let Some(digest) = &self.dataset.sha256 {
            let valid = digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                return Err(AppError::Config(
                    "dataset.sha256 must be a 64-character hex digest".into(),
                ));
            }
        }
        Ok(())
    }
}
