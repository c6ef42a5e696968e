//! Lesson dataset staging.
//!
//! Fetches the configured dataset from an HTTP(S) URL or a local file,
//! optionally verifies its SHA-256 digest, and writes it into the
//! engine workspace at the path lesson code expects.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::DatasetConfig;
use crate::engine::LanguageEngine;
use crate::{AppError, Result};

/// Fetch the dataset bytes from the configured source.
///
/// Sources beginning with `http://` or `https://` are fetched over HTTP;
/// anything else is read from the local filesystem.
///
/// # Errors
///
/// Returns [`AppError::Dataset`] if the fetch fails, the server answers
/// with a non-success status, or the file cannot be read.
pub async fn fetch(config: &DatasetConfig) -> Result<Bytes> {
    let source = config.source.as_str();

    if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source)
            .await
            .map_err(|e| AppError::Dataset(format!("fetch failed for {source}: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::Dataset(format!("fetch failed for {source}: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Dataset(format!("fetch failed for {source}: {e}")))?;
        debug!(source, bytes = bytes.len(), "dataset fetched over http");
        Ok(bytes)
    } else {
        let contents = tokio::fs::read(source)
            .await
            .map_err(|e| AppError::Dataset(format!("failed to read dataset {source}: {e}")))?;
        debug!(source, bytes = contents.len(), "dataset read from disk");
        Ok(contents.into())
    }
}

/// Verify that `data` hashes to `expected` (SHA-256, lowercase hex).
///
/// # Errors
///
/// Returns [`AppError::Dataset`] on a digest mismatch.
pub fn verify(data: &[u8], expected: &str) -> Result<()> {
    let actual = sha256_hex(data);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(AppError::Dataset(format!(
            "dataset checksum mismatch: expected {expected}, got {actual}"
        )))
    }
}

/// Fetch, verify, and stage the dataset into the engine workspace.
///
/// The dataset lands at `config.engine_path`, the workspace-relative
/// location lesson code reads from.
///
/// # Errors
///
/// Returns [`AppError::Dataset`] if fetching or verification fails, or
/// the engine's error if staging the file fails.
pub async fn stage(engine: &dyn LanguageEngine, config: &DatasetConfig) -> Result<()> {
    let bytes = fetch(config).await?;

    if let Some(ref expected) = config.sha256 {
        verify(&bytes, expected)?;
    }

    let size = bytes.len();
    engine.write_file(&config.engine_path, bytes).await?;
    info!(
        source = config.source.as_str(),
        engine_path = config.engine_path.as_str(),
        bytes = size,
        "dataset staged into engine workspace"
    );
    Ok(())
}

/// Compute SHA-256 hex digest of the given bytes.
fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
