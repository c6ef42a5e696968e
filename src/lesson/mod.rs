//! Lesson content: loading TOML modules and addressing them by id.
//!
//! Curriculum content ships as TOML files, one module per file, parsed
//! into [`LessonModule`] values and validated on load. A catalog is the
//! ordered set of modules found in a directory; ordering follows the
//! file names so authors control sequence with `module-1.toml`,
//! `module-2.toml`, and so on.

pub mod progress;

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::models::lesson::LessonModule;
use crate::{AppError, Result};

/// Parse and validate one lesson module from TOML text.
///
/// # Errors
///
/// Returns [`AppError::Lesson`] when the TOML does not parse or
/// validation rejects the content.
pub fn from_toml_str(raw: &str) -> Result<LessonModule> {
    let module: LessonModule =
        toml::from_str(raw).map_err(|e| AppError::Lesson(format!("invalid lesson toml: {e}")))?;
    module.validate()?;
    Ok(module)
}

/// Load and validate one lesson module file.
///
/// # Errors
///
/// Returns [`AppError::Io`] when the file cannot be read, plus the
/// parse/validation errors of [`from_toml_str`].
pub async fn load_module(path: &Path) -> Result<Arc<LessonModule>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::Io(format!("failed to read lesson file {}: {e}", path.display())))?;
    let module = from_toml_str(&raw)?;
    debug!(
        path = %path.display(),
        module_id = module.id.as_str(),
        steps = module.steps.len(),
        "lesson module loaded"
    );
    Ok(Arc::new(module))
}

/// Load every `*.toml` module in `dir`, ordered by file name.
///
/// # Errors
///
/// Returns [`AppError::Io`] when the directory cannot be listed, any
/// per-file error from [`load_module`], or [`AppError::Lesson`] when two
/// files declare the same module id.
pub async fn load_catalog(dir: &Path) -> Result<Vec<Arc<LessonModule>>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::Io(format!("failed to list lesson dir {}: {e}", dir.display())))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::Io(format!("failed to list lesson dir {}: {e}", dir.display())))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut catalog = Vec::with_capacity(paths.len());
    for path in &paths {
        let module = load_module(path).await?;
        if catalog.iter().any(|m: &Arc<LessonModule>| m.id == module.id) {
            return Err(AppError::Lesson(format!(
                "duplicate module id `{}` in {}",
                module.id,
                path.display()
            )));
        }
        catalog.push(module);
    }

    info!(dir = %dir.display(), modules = catalog.len(), "lesson catalog loaded");
    Ok(catalog)
}

/// Find a module in the catalog by its id.
#[must_use]
pub fn find_module<'a>(
    catalog: &'a [Arc<LessonModule>],
    id: &str,
) -> Option<&'a Arc<LessonModule>> {
    catalog.iter().find(|module| module.id == id)
}
