//! Shared error types for the services crate.

use thiserror::Error;

use backend::BackendError;

/// The assessment could not be loaded. Fatal for the attempt.
#[derive(Debug, Error)]
#[error("failed to load assessment: {0}")]
pub struct LoadFailure(#[from] pub BackendError);

impl LoadFailure {
    /// Text shown to the user before leaving the runner screen.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.0 {
            BackendError::NotFound => self.0.user_message(),
            _ => "Failed to load assessment".to_owned(),
        }
    }
}

/// The answers could not be submitted. The attempt stays open for a retry.
#[derive(Debug, Error)]
#[error("failed to submit assessment: {0}")]
pub struct SubmitFailure(#[from] pub BackendError);

impl SubmitFailure {
    /// Backend-provided detail when there is one, a generic text otherwise.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.0 {
            BackendError::NotFound
            | BackendError::Forbidden(_)
            | BackendError::Status { .. } => self.0.user_message(),
            _ => "Failed to submit assessment".to_owned(),
        }
    }
}

/// Errors emitted by `AssessmentRunner`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerError {
    #[error(transparent)]
    Load(#[from] LoadFailure),
    #[error(transparent)]
    Submit(#[from] SubmitFailure),
    #[error("assessment run already started")]
    AlreadyStarted,
    #[error("assessment has not been loaded yet")]
    NotStarted,
    #[error("assessment run is finished")]
    Finished,
    #[error("assessment run was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_failure_prefers_backend_detail() {
        let failure = SubmitFailure(BackendError::Forbidden("Upgrade to Premium!".into()));
        assert_eq!(failure.message(), "Upgrade to Premium!");

        let failure = SubmitFailure(BackendError::Unavailable("down".into()));
        assert_eq!(failure.message(), "Failed to submit assessment");
    }

    #[test]
    fn load_failure_message_is_generic_except_not_found() {
        assert_eq!(
            LoadFailure(BackendError::Unavailable("x".into())).message(),
            "Failed to load assessment"
        );
        assert_eq!(
            LoadFailure(BackendError::NotFound).message(),
            "Assessment not found"
        );
    }
}
