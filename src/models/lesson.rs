//! Static lesson content model: modules, steps, and the step phase.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A step's mode: read-only worked solution, or learner-editable practice.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Read-only preview of the step's worked solution.
    #[default]
    Preview,
    /// Learner-editable practice against the scaffold buffer.
    Practice,
}

/// One authored curriculum step.
///
/// Content is immutable for the lifetime of the app; only the learner's
/// code buffer (held by the progression engine, not here) changes.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LessonStep {
    /// Stable step identifier, unique within its module.
    pub id: String,
    /// Short display title.
    pub title: String,
    /// Markdown shown during the preview phase.
    pub preview_instructions: String,
    /// Worked solution code, shown read-only in preview.
    pub solution_code: String,
    /// Markdown shown during the practice phase.
    pub practice_instructions: String,
    /// Starting-point code seeded into the learner's buffer.
    pub scaffold_code: String,
    /// Code run silently before each visible run of this step, if any.
    #[serde(default)]
    pub setup_code: Option<String>,
}

/// An authored curriculum module: an ordered sequence of steps.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LessonModule {
    /// Stable module identifier (e.g. `module-1`).
    pub id: String,
    /// Display title.
    pub title: String,
    /// One-paragraph module description.
    pub description: String,
    /// Ordered steps; never empty after validation.
    pub steps: Vec<LessonStep>,
}

impl LessonModule {
    /// Validate authored content before it enters the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Lesson`] when the module id or title is empty,
    /// the step list is empty, or any step id is empty or duplicated.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::Lesson("module id must not be empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(AppError::Lesson(format!(
                "module '{}' has an empty title",
                self.id
            )));
        }
        if self.steps.is_empty() {
            return Err(AppError::Lesson(format!(
                "module '{}' has no steps",
                self.id
            )));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(AppError::Lesson(format!(
                    "module '{}' contains a step with an empty id",
                    self.id
                )));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(AppError::Lesson(format!(
                    "module '{}' contains duplicate step id '{}'",
                    self.id, step.id
                )));
            }
        }

        Ok(())
    }

    /// Look up a step by id.
    #[must_use]
    pub fn step(&self, id: &str) -> Option<&LessonStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}
