#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod lesson;
pub mod models;
pub mod session;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
