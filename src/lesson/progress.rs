//! Lesson progression state machine.
//!
//! Tracks one learner's position inside a module: current step, the
//! preview/practice phase split, a code buffer per step, and the set of
//! completed steps. Navigation mutators perform clamped moves; whether a
//! move should be offered at all is the frontend's question, answered by
//! the `can_go_*` queries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::models::lesson::{LessonModule, LessonStep, Phase};
use crate::{AppError, Result};

/// One learner's progress through a lesson module.
///
/// Every step's buffer is seeded from its scaffold at construction, so a
/// buffer entry exists for any step the learner can reach. Entries are
/// overwritten by edits, never removed; leaving a step and coming back
/// restores the learner's code.
#[derive(Debug, Clone)]
pub struct LessonSession {
    module: Arc<LessonModule>,
    step_index: usize,
    phase: Phase,
    buffers: HashMap<String, String>,
    completed: HashSet<String>,
}

impl LessonSession {
    /// Start a session at the first step, in preview.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Lesson`] when the module has no steps, which
    /// validated content never does.
    pub fn new(module: Arc<LessonModule>) -> Result<Self> {
        if module.steps.is_empty() {
            return Err(AppError::Lesson(format!(
                "module `{}` has no steps",
                module.id
            )));
        }
        let buffers = module
            .steps
            .iter()
            .map(|step| (step.id.clone(), step.scaffold_code.clone()))
            .collect();
        Ok(Self {
            module,
            step_index: 0,
            phase: Phase::Preview,
            buffers,
            completed: HashSet::new(),
        })
    }

    /// Enter the practice phase for the current step. Idempotent.
    pub fn start_coding(&mut self) {
        self.phase = Phase::Practice;
    }

    /// Record the learner's edit to the current step's buffer.
    ///
    /// Ignored in preview: the solution pane is read-only there and must
    /// not leak into the learner's buffer.
    pub fn set_code(&mut self, code: impl Into<String>) {
        if self.phase == Phase::Practice {
            self.buffers.insert(self.current_step().id.clone(), code.into());
        }
    }

    /// Mark the current step completed.
    pub fn mark_completed(&mut self) {
        let id = self.current_step().id.clone();
        self.completed.insert(id);
    }

    /// Move forward one step, clamped at the last, landing in preview.
    ///
    /// Whether forward navigation should be offered is answered by
    /// [`LessonSession::can_go_next`]; the move itself does not check it.
    pub fn go_to_next(&mut self) {
        self.step_index = (self.step_index + 1).min(self.module.steps.len() - 1);
        self.phase = Phase::Preview;
    }

    /// Move backward: practice returns to the same step's preview, and
    /// preview moves to the previous step's preview, clamped at the first.
    pub fn go_to_prev(&mut self) {
        match self.phase {
            Phase::Practice => self.phase = Phase::Preview,
            Phase::Preview => self.step_index = self.step_index.saturating_sub(1),
        }
    }

    /// Jump to an arbitrary step in preview. Out-of-range is a no-op.
    pub fn go_to_step(&mut self, index: usize) {
        if index < self.module.steps.len() {
            self.step_index = index;
            self.phase = Phase::Preview;
        }
    }

    /// Whether backward navigation changes anything.
    ///
    /// False only at the first step's preview, where there is nothing
    /// before to return to.
    #[must_use]
    pub fn can_go_prev(&self) -> bool {
        !(self.step_index == 0 && self.phase == Phase::Preview)
    }

    /// Whether forward navigation should be offered.
    ///
    /// Requires being in practice with the current step completed, and a
    /// next step to move to.
    #[must_use]
    pub fn can_go_next(&self) -> bool {
        !self.is_last_step()
            && self.phase == Phase::Practice
            && self.completed.contains(&self.current_step().id)
    }

    /// Code shown in the editor: the solution in preview, the learner's
    /// buffer in practice.
    #[must_use]
    pub fn current_code(&self) -> &str {
        let step = self.current_step();
        match self.phase {
            Phase::Preview => &step.solution_code,
            Phase::Practice => self
                .buffers
                .get(&step.id)
                .map_or(step.scaffold_code.as_str(), String::as_str),
        }
    }

    /// The step the learner is on.
    #[must_use]
    pub fn current_step(&self) -> &LessonStep {
        &self.module.steps[self.step_index]
    }

    /// Zero-based index of the current step.
    #[must_use]
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    /// Number of steps in the module.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.module.steps.len()
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the current step is the module's last.
    #[must_use]
    pub fn is_last_step(&self) -> bool {
        self.step_index + 1 == self.module.steps.len()
    }

    /// Whether the step with `id` has been completed.
    #[must_use]
    pub fn is_completed(&self, id: &str) -> bool {
        self.completed.contains(id)
    }

    /// The module this session walks.
    #[must_use]
    pub fn module(&self) -> &LessonModule {
        &self.module
    }
}
