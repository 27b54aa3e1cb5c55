//! Step engine: generic multi-step conversational forms.
//!
//! A [`Flow`] is a fixed, ordered list of [`Step`]s. The [`StepEngine`] keeps
//! one draft per conversation, feeds each inbound message to the current
//! step, and hands the finished draft to the flow's commit.

pub mod engine;
pub mod step;

pub use engine::{Flow, Participant, Session, StepEngine, StepResult};
pub use step::{Step, StepHandler, StepOutcome, Suggestions, parse_bounded};
