use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use crate::model::ids::{AssessmentId, QuestionId};

//
// ─── TEST TYPE ─────────────────────────────────────────────────────────────────
//

/// Kind of assessment offered by the backend.
///
/// Unknown kinds are preserved verbatim so newer backends keep working.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TestType {
    Aptitude,
    Personality,
    CareerInterest,
    SkillAssessment,
    Other(String),
}

impl TestType {
    /// The four kinds the product ships with.
    pub const KNOWN: [TestType; 4] = [
        TestType::Aptitude,
        TestType::Personality,
        TestType::CareerInterest,
        TestType::SkillAssessment,
    ];

    /// Wire name used in query strings and JSON bodies.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            TestType::Aptitude => "aptitude",
            TestType::Personality => "personality",
            TestType::CareerInterest => "career_interest",
            TestType::SkillAssessment => "skill_assessment",
            TestType::Other(raw) => raw,
        }
    }

    /// Human readable title.
    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            TestType::Aptitude => "Aptitude Test",
            TestType::Personality => "Personality Assessment",
            TestType::CareerInterest => "Career Interest Test",
            TestType::SkillAssessment => "Skill Assessment",
            TestType::Other(raw) => raw,
        }
    }
}

impl From<&str> for TestType {
    fn from(value: &str) -> Self {
        match value {
            "aptitude" => TestType::Aptitude,
            "personality" => TestType::Personality,
            "career_interest" => TestType::CareerInterest,
            "skill_assessment" => TestType::SkillAssessment,
            other => TestType::Other(other.to_owned()),
        }
    }
}

impl From<String> for TestType {
    fn from(value: String) -> Self {
        TestType::from(value.as_str())
    }
}

impl From<TestType> for String {
    fn from(value: TestType) -> Self {
        value.as_str().to_owned()
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has no options")]
    NoOptions(QuestionId),
}

/// A single multiple-choice question. Option position is the selection key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
}

impl Question {
    /// Build a question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::NoOptions` if `options` is empty.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Self, QuestionError> {
        if options.is_empty() {
            return Err(QuestionError::NoOptions(id));
        }
        Ok(Self {
            id,
            text: text.into(),
            options,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn has_option(&self, index: usize) -> bool {
        index < self.options.len()
    }

    /// Display letter for an option position (`A`, `B`, ...), `None` past `Z`.
    #[must_use]
    pub fn option_label(index: usize) -> Option<char> {
        u8::try_from(index)
            .ok()
            .filter(|i| *i < 26)
            .map(|i| char::from(b'A' + i))
    }
}

//
// ─── ASSESSMENT ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AssessmentError {
    #[error("assessment has no questions")]
    NoQuestions,
    #[error("question id {0} appears more than once")]
    DuplicateQuestion(QuestionId),
    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// An ordered, immutable list of questions making up one quiz instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    id: AssessmentId,
    test_type: TestType,
    questions: Vec<Question>,
}

impl Assessment {
    /// Build an assessment, keeping question order as given.
    ///
    /// # Errors
    ///
    /// Returns `AssessmentError::NoQuestions` for an empty list and
    /// `AssessmentError::DuplicateQuestion` if two questions share an id.
    pub fn new(
        id: AssessmentId,
        test_type: TestType,
        questions: Vec<Question>,
    ) -> Result<Self, AssessmentError> {
        if questions.is_empty() {
            return Err(AssessmentError::NoQuestions);
        }

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id()) {
                return Err(AssessmentError::DuplicateQuestion(question.id().clone()));
            }
        }

        Ok(Self {
            id,
            test_type,
            questions,
        })
    }

    #[must_use]
    pub fn id(&self) -> &AssessmentId {
        &self.id
    }

    #[must_use]
    pub fn test_type(&self) -> &TestType {
        &self.test_type
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    /// Number of questions; always at least one.
    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn last_index(&self) -> usize {
        self.questions.len() - 1
    }
}
