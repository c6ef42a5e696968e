//! Code execution: the capture pipeline and the run-state orchestrator.

pub mod orchestrator;
pub mod pipeline;
