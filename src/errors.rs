//! The crate-wide error enum and result alias.

use std::fmt::{Display, Formatter};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;

/// Every failure mode the crate reports, by domain.
///
/// Variants carry a message rather than a source chain; the Display
/// prefix (`engine:`, `dataset:`, …) is what frontends and logs key on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration could not be parsed or failed validation.
    Config(String),
    /// Engine adapter process or wire-protocol failure.
    Engine(String),
    /// A session bring-up stage exceeded its time bound.
    Timeout(String),
    /// Dataset fetch, read, or integrity-check failure.
    Dataset(String),
    /// Session lifecycle misuse (e.g. execution without a live session).
    Session(String),
    /// Lesson content loading or validation failure.
    Lesson(String),
    /// A filesystem operation failed.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Engine(msg) => write!(f, "engine: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Dataset(msg) => write!(f, "dataset: {msg}"),
            Self::Session(msg) => write!(f, "session: {msg}"),
            Self::Lesson(msg) => write!(f, "lesson: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Dataset(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Engine(format!("malformed json: {err}"))
    }
}
