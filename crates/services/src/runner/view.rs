use serde::Serialize;

use assess_core::model::{AssessmentId, Question, QuestionId};
use backend::SubmissionReceipt;

use super::attempt::AttemptState;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Answers were accepted by the backend.
    Success,
    /// The assessment could not be loaded.
    Failure,
    /// The user left before submitting.
    Abandoned,
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase", content = "outcome")]
pub enum RunnerPhase {
    Loading,
    InProgress,
    Submitting,
    Terminal(Termination),
}

impl RunnerPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunnerPhase::Terminal(_))
    }
}

/// One selectable option of the open question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OptionView {
    pub index: usize,
    pub label: Option<char>,
    pub text: String,
    pub selected: bool,
}

/// The open question as a host screen renders it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<OptionView>,
}

impl QuestionView {
    fn build(question: &Question, selected: Option<usize>) -> Self {
        let options = question
            .options()
            .iter()
            .enumerate()
            .map(|(index, text)| OptionView {
                index,
                label: Question::option_label(index),
                text: text.clone(),
                selected: selected == Some(index),
            })
            .collect();
        Self {
            id: question.id().clone(),
            text: question.text().to_owned(),
            options,
        }
    }
}

/// Presentation-agnostic picture of a run at one instant.
///
/// No pre-formatted strings beyond the backend-provided texts; the host
/// decides how to show time and progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerSnapshot {
    pub phase: RunnerPhase,
    pub assessment_id: Option<AssessmentId>,
    pub current_index: usize,
    pub question_count: usize,
    pub answered: usize,
    pub time_remaining: u32,
    pub selected_option: Option<usize>,
    pub is_low_time: bool,
    pub question: Option<QuestionView>,
    /// Last user-visible error, cleared when a new submission starts.
    pub error: Option<String>,
}

impl RunnerSnapshot {
    pub(crate) fn loading(assessment_id: Option<AssessmentId>) -> Self {
        Self {
            phase: RunnerPhase::Loading,
            assessment_id,
            current_index: 0,
            question_count: 0,
            answered: 0,
            time_remaining: 0,
            selected_option: None,
            is_low_time: false,
            question: None,
            error: None,
        }
    }

    pub(crate) fn capture(
        phase: RunnerPhase,
        assessment_id: Option<&AssessmentId>,
        attempt: Option<&AttemptState>,
        error: Option<&str>,
    ) -> Self {
        let mut snapshot = Self::loading(assessment_id.cloned());
        snapshot.phase = phase;
        snapshot.error = error.map(str::to_owned);
        if let Some(attempt) = attempt {
            let countdown = attempt.countdown();
            snapshot.current_index = attempt.current_index();
            snapshot.question_count = attempt.assessment().question_count();
            snapshot.answered = attempt.answers().len();
            snapshot.time_remaining = countdown.remaining();
            snapshot.selected_option = attempt.selected();
            snapshot.is_low_time = countdown.is_low();
            snapshot.question = Some(QuestionView::build(
                attempt.current_question(),
                attempt.selected(),
            ));
        }
        snapshot
    }

    /// Fraction of the assessment reached, counting the open question.
    #[must_use]
    pub fn progress(&self) -> f32 {
        if self.question_count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = (self.current_index + 1) as f32 / self.question_count as f32;
        fraction
    }

    /// Whether the primary action submits instead of moving on.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.question_count > 0 && self.current_index + 1 == self.question_count
    }
}

/// One-shot signals for the host screen.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerEvent {
    /// The run cannot continue; leave the runner screen.
    NavigateBack { message: String },
    /// Answers were accepted; show the report for this assessment.
    ShowReport {
        assessment_id: AssessmentId,
        receipt: SubmissionReceipt,
    },
    /// Submission was rejected; answers are kept and the user may retry.
    SubmitFailed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assess_core::model::{Assessment, TestType};
    use assess_core::time::fixed_now;

    fn attempt() -> AttemptState {
        let questions = (1..=4)
            .map(|i| {
                Question::new(
                    QuestionId::number(i),
                    format!("Q{i}"),
                    vec!["yes".into(), "no".into()],
                )
                .unwrap()
            })
            .collect();
        let assessment =
            Assessment::new(AssessmentId::new("a1"), TestType::Personality, questions).unwrap();
        AttemptState::new(assessment, fixed_now())
    }

    #[test]
    fn snapshot_reflects_open_question_and_selection() {
        let mut attempt = attempt();
        attempt.advance();
        attempt.select(1);

        let snapshot = RunnerSnapshot::capture(
            RunnerPhase::InProgress,
            Some(attempt.assessment().id()),
            Some(&attempt),
            None,
        );
        assert_eq!(snapshot.current_index, 1);
        assert_eq!(snapshot.answered, 1);
        assert_eq!(snapshot.selected_option, Some(1));
        assert!((snapshot.progress() - 0.5).abs() < f32::EPSILON);
        assert!(!snapshot.is_last_question());

        let question = snapshot.question.unwrap();
        assert_eq!(question.text, "Q2");
        let labels: Vec<_> = question.options.iter().map(|o| o.label).collect();
        assert_eq!(labels, [Some('A'), Some('B')]);
        assert!(question.options[1].selected);
        assert!(!question.options[0].selected);
    }

    #[test]
    fn loading_snapshot_has_no_progress() {
        let snapshot = RunnerSnapshot::loading(None);
        assert_eq!(snapshot.progress(), 0.0);
        assert!(snapshot.question.is_none());
    }

    #[test]
    fn phase_serializes_with_outcome() {
        let json = serde_json::to_value(RunnerPhase::Terminal(Termination::Abandoned)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"phase": "terminal", "outcome": "abandoned"})
        );
        let json = serde_json::to_value(RunnerPhase::InProgress).unwrap();
        assert_eq!(json, serde_json::json!({"phase": "in_progress"}));
    }
}
