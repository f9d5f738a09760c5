//! Investigation Workflow
//!
//! The state threaded through the stages, the pipeline that chains them,
//! and the engine that runs one pipeline task per alert.

pub mod engine;
pub mod pipeline;
pub mod state;

pub use engine::{RunHandle, RunState, TriageEngine};
pub use pipeline::Pipeline;
pub use state::{InvestigationOutcome, InvestigationState, Verification};
