mod attempt;
mod timer;
mod view;
mod workflow;

// Public API of the assessment runner.
pub use crate::error::{LoadFailure, RunnerError, SubmitFailure};
pub use attempt::{AdvanceOutcome, AttemptState};
pub use view::{OptionView, QuestionView, RunnerEvent, RunnerPhase, RunnerSnapshot, Termination};
pub use workflow::{Advanced, AssessmentRunner};
