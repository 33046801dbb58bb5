use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::assessment::TestType;
use crate::model::ids::{AssessmentId, QuestionId};

/// The recorded outcome of one question.
///
/// `selected` is `None` when the question was closed without a pick,
/// typically because its countdown ran out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub selected: Option<usize>,
}

impl Answer {
    #[must_use]
    pub fn new(question_id: QuestionId, selected: Option<usize>) -> Self {
        Self {
            question_id,
            selected,
        }
    }

    #[must_use]
    pub fn is_unanswered(&self) -> bool {
        self.selected.is_none()
    }
}

/// A completed assessment as listed in the user's history.
#[derive(Debug, Clone, PartialEq)]
pub struct AssessmentSummary {
    pub id: AssessmentId,
    pub test_type: TestType,
    pub score: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}
