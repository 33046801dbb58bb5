mod answer;
mod assessment;
mod ids;

pub use answer::{Answer, AssessmentSummary};
pub use assessment::{Assessment, AssessmentError, Question, QuestionError, TestType};
pub use ids::{AssessmentId, QuestionId};
