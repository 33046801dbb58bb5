use serde::Deserialize;

use assess_core::model::{
    Assessment, AssessmentId, AssessmentSummary, Question, QuestionId, TestType,
};

use crate::client::{BackendError, parse_timestamp};

/// `GET /assessments/{id}` and `POST /assessments/start` body.
///
/// The backend returns more fields (user id, stored answers, report); only
/// what the runner needs is decoded.
#[derive(Debug, Deserialize)]
pub(crate) struct AssessmentDto {
    pub id: String,
    #[serde(default)]
    pub test_type: Option<String>,
    pub questions: Vec<QuestionDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionDto {
    pub id: QuestionId,
    pub question: String,
    pub options: Vec<String>,
}

/// One entry of `GET /assessments/history`.
#[derive(Debug, Deserialize)]
pub(crate) struct HistoryItemDto {
    pub id: String,
    #[serde(default)]
    pub test_type: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub completed_at: Option<String>,
}

/// FastAPI-style error body: `{"detail": "..."}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDto {
    pub detail: serde_json::Value,
}

impl ErrorDto {
    pub(crate) fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

fn test_type_or_default(raw: Option<String>) -> TestType {
    raw.map_or(TestType::Aptitude, TestType::from)
}

impl AssessmentDto {
    pub(crate) fn into_assessment(self) -> Result<Assessment, BackendError> {
        let questions = self
            .questions
            .into_iter()
            .map(|q| Question::new(q.id, q.question, q.options))
            .collect::<Result<Vec<_>, _>>()
            .map_err(assess_core::Error::from)?;

        let assessment = Assessment::new(
            AssessmentId::new(self.id),
            test_type_or_default(self.test_type),
            questions,
        )
        .map_err(assess_core::Error::from)?;
        Ok(assessment)
    }
}

impl HistoryItemDto {
    pub(crate) fn into_summary(self) -> AssessmentSummary {
        AssessmentSummary {
            id: AssessmentId::new(self.id),
            test_type: test_type_or_default(self.test_type),
            score: self.score,
            completed_at: self.completed_at.as_deref().and_then(parse_timestamp),
        }
    }
}
