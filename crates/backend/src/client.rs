use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

use assess_core::Clock;
use assess_core::model::{
    Answer, Assessment, AssessmentId, AssessmentSummary, Question, TestType,
};

/// Errors surfaced by backend adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("assessment not found")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("backend returned {status}: {detail}")]
    Status {
        status: reqwest::StatusCode,
        detail: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("invalid assessment: {0}")]
    Invalid(#[from] assess_core::Error),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Short text suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            BackendError::NotFound => "Assessment not found".to_owned(),
            BackendError::Forbidden(detail) | BackendError::Status { detail, .. } => {
                detail.clone()
            }
            BackendError::Transport(_) | BackendError::Unavailable(_) => {
                "Could not reach the server".to_owned()
            }
            BackendError::Decode(_) | BackendError::Invalid(_) => {
                "The server sent an unexpected response".to_owned()
            }
        }
    }
}

/// Body of the submit call: every recorded answer, in question order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub assessment_id: AssessmentId,
    pub answers: Vec<Answer>,
}

/// Acknowledgement returned by the submit call.
///
/// Scoring and the AI report are produced server-side; the report is kept
/// as opaque JSON and handed to the report view untouched.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub xp_earned: u32,
    #[serde(default)]
    pub ai_report: serde_json::Value,
}

/// Contract for the remote assessment service.
#[async_trait]
pub trait AssessmentBackend: Send + Sync {
    /// Create a new assessment of the given kind.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Forbidden` when the user may not start more tests.
    async fn start_assessment(&self, test_type: &TestType) -> Result<Assessment, BackendError>;

    /// Fetch an assessment by id.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if missing, or other backend errors.
    async fn fetch_assessment(&self, id: &AssessmentId) -> Result<Assessment, BackendError>;

    /// Submit the final answers of an attempt.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the submission is rejected or not delivered.
    async fn submit_assessment(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReceipt, BackendError>;

    /// List completed assessments, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` for transport or decoding failures.
    async fn assessment_history(&self) -> Result<Vec<AssessmentSummary>, BackendError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

/// Questions drawn from a template when a test is started.
pub const QUESTIONS_PER_TEST: usize = 15;

#[derive(Default)]
struct InMemoryState {
    templates: HashMap<TestType, Vec<Question>>,
    assessments: HashMap<AssessmentId, Assessment>,
    completed: Vec<(AssessmentSummary, SubmissionReceipt)>,
    submissions: Vec<Submission>,
    fetch_calls: usize,
    submit_calls: usize,
    failing_fetches: usize,
    failing_submits: usize,
}

/// Simple in-memory backend for testing and prototyping.
///
/// Failures can be scripted per call and an artificial latency keeps
/// requests in flight long enough to race against them.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    state: Arc<Mutex<InMemoryState>>,
    latency: Option<Duration>,
    clock: Clock,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, InMemoryState>, BackendError> {
        self.state
            .lock()
            .map_err(|e| BackendError::Unavailable(e.to_string()))
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Store an assessment so it can be fetched by id.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` if the state lock is poisoned.
    pub fn insert_assessment(&self, assessment: Assessment) -> Result<(), BackendError> {
        let mut guard = self.lock()?;
        guard
            .assessments
            .insert(assessment.id().clone(), assessment);
        Ok(())
    }

    /// Register the question set used when starting a test of `test_type`.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unavailable` if the state lock is poisoned.
    pub fn insert_template(
        &self,
        test_type: TestType,
        questions: Vec<Question>,
    ) -> Result<(), BackendError> {
        let mut guard = self.lock()?;
        guard.templates.insert(test_type, questions);
        Ok(())
    }

    /// Make the next `count` fetch calls fail.
    pub fn fail_next_fetches(&self, count: usize) {
        if let Ok(mut guard) = self.lock() {
            guard.failing_fetches = count;
        }
    }

    /// Make the next `count` submit calls fail.
    pub fn fail_next_submits(&self, count: usize) {
        if let Ok(mut guard) = self.lock() {
            guard.failing_submits = count;
        }
    }

    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.lock().map(|g| g.fetch_calls).unwrap_or_default()
    }

    #[must_use]
    pub fn submit_calls(&self) -> usize {
        self.lock().map(|g| g.submit_calls).unwrap_or_default()
    }

    /// Every submit body received, including the ones that were failed on purpose.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock()
            .map(|g| g.submissions.clone())
            .unwrap_or_default()
    }
}

fn completion_score(assessment: &Assessment, answers: &[Answer]) -> f64 {
    let answered = answers.iter().filter(|a| !a.is_unanswered()).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = answered as f64 / assessment.question_count() as f64;
    (ratio * 100.0).round()
}

#[async_trait]
impl AssessmentBackend for InMemoryBackend {
    async fn start_assessment(&self, test_type: &TestType) -> Result<Assessment, BackendError> {
        self.simulate_latency().await;
        let mut guard = self.lock()?;
        let mut questions = guard.templates.get(test_type).cloned().ok_or_else(|| {
            BackendError::Status {
                status: reqwest::StatusCode::BAD_REQUEST,
                detail: "Invalid test type".to_owned(),
            }
        })?;
        questions.shuffle(&mut rand::rng());
        questions.truncate(QUESTIONS_PER_TEST);
        let assessment = Assessment::new(AssessmentId::generate(), test_type.clone(), questions)
            .map_err(assess_core::Error::from)?;
        guard
            .assessments
            .insert(assessment.id().clone(), assessment.clone());
        Ok(assessment)
    }

    async fn fetch_assessment(&self, id: &AssessmentId) -> Result<Assessment, BackendError> {
        self.simulate_latency().await;
        let mut guard = self.lock()?;
        guard.fetch_calls += 1;
        if guard.failing_fetches > 0 {
            guard.failing_fetches -= 1;
            return Err(BackendError::Unavailable("scripted fetch failure".into()));
        }
        guard
            .assessments
            .get(id)
            .cloned()
            .ok_or(BackendError::NotFound)
    }

    async fn submit_assessment(
        &self,
        submission: &Submission,
    ) -> Result<SubmissionReceipt, BackendError> {
        self.simulate_latency().await;
        let now = self.clock.now();
        let mut guard = self.lock()?;
        guard.submit_calls += 1;
        guard.submissions.push(submission.clone());
        if guard.failing_submits > 0 {
            guard.failing_submits -= 1;
            return Err(BackendError::Unavailable("scripted submit failure".into()));
        }

        if guard
            .completed
            .iter()
            .any(|(summary, _)| summary.id == submission.assessment_id)
        {
            return Err(BackendError::Status {
                status: reqwest::StatusCode::BAD_REQUEST,
                detail: "Assessment already completed".to_owned(),
            });
        }
        let assessment = guard
            .assessments
            .get(&submission.assessment_id)
            .ok_or(BackendError::NotFound)?;

        let score = completion_score(assessment, &submission.answers);
        let summary = AssessmentSummary {
            id: assessment.id().clone(),
            test_type: assessment.test_type().clone(),
            score: Some(score),
            completed_at: Some(now),
        };
        let receipt = SubmissionReceipt {
            score,
            xp_earned: 50,
            ai_report: serde_json::json!({ "summary": format!("Score {score}%") }),
        };
        guard.completed.push((summary, receipt.clone()));
        Ok(receipt)
    }

    async fn assessment_history(&self) -> Result<Vec<AssessmentSummary>, BackendError> {
        self.simulate_latency().await;
        let guard = self.lock()?;
        let mut items: Vec<AssessmentSummary> =
            guard.completed.iter().map(|(s, _)| s.clone()).collect();
        items.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(items)
    }
}

/// Parse a backend timestamp, accepting both RFC 3339 and naive UTC forms.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
