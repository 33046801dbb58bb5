#![forbid(unsafe_code)]

pub mod error;
pub mod runner;

pub use assess_core::Clock;

pub use error::{LoadFailure, RunnerError, SubmitFailure};
pub use runner::{
    AdvanceOutcome, Advanced, AssessmentRunner, AttemptState, OptionView, QuestionView,
    RunnerEvent, RunnerPhase, RunnerSnapshot, Termination,
};
