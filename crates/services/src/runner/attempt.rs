use chrono::{DateTime, Utc};
use std::fmt;

use assess_core::model::{Answer, Assessment, Question};
use assess_core::{Countdown, TickOutcome};
use backend::Submission;

/// Result of trying to close out a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The targeted question is no longer current, or answers are being submitted.
    Ignored,
    /// The answer was recorded and the question at `index` is now open.
    Next { index: usize },
    /// The last answer was recorded; the attempt is ready to submit.
    ReadyToSubmit,
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// In-memory progression through one assessment.
///
/// Steps through the questions in order, keeping one pending selection and a
/// countdown for the open question. An answer is appended only when the
/// question is closed, so while in progress `answers().len() == current_index()`
/// except after a rejected submission: the last answer then stays recorded
/// until the retry replaces it.
pub struct AttemptState {
    assessment: Assessment,
    current: usize,
    answers: Vec<Answer>,
    countdown: Countdown,
    selected: Option<usize>,
    submitting: bool,
    started_at: DateTime<Utc>,
}

impl AttemptState {
    #[must_use]
    pub fn new(assessment: Assessment, started_at: DateTime<Utc>) -> Self {
        let answers = Vec::with_capacity(assessment.question_count());
        Self {
            assessment,
            current: 0,
            answers,
            countdown: Countdown::per_question(),
            selected: None,
            submitting: false,
            started_at,
        }
    }

    #[must_use]
    pub fn assessment(&self) -> &Assessment {
        &self.assessment
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.assessment.questions()[self.current]
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current == self.assessment.last_index()
    }

    #[must_use]
    pub fn answers(&self) -> &[Answer] {
        &self.answers
    }

    #[must_use]
    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    #[must_use]
    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Set the pending selection for the open question.
    ///
    /// Returns `false` (and changes nothing) for an out-of-range index or
    /// while answers are being submitted.
    pub fn select(&mut self, option: usize) -> bool {
        if self.submitting || !self.current_question().has_option(option) {
            return false;
        }
        self.selected = Some(option);
        true
    }

    /// Count one second off the open question.
    pub fn tick(&mut self) -> TickOutcome {
        if self.submitting {
            return TickOutcome::Idle;
        }
        self.countdown.tick()
    }

    /// Close question `expected` with the pending selection.
    ///
    /// Does nothing unless `expected` is the open question, so a second
    /// trigger aimed at an already closed question cannot record twice.
    pub fn advance_from(&mut self, expected: usize) -> AdvanceOutcome {
        if self.submitting || expected != self.current {
            return AdvanceOutcome::Ignored;
        }

        let question_id = self.current_question().id().clone();
        self.answers.truncate(self.current);
        self.answers.push(Answer::new(question_id, self.selected.take()));

        if self.is_last_question() {
            self.submitting = true;
            return AdvanceOutcome::ReadyToSubmit;
        }

        self.current += 1;
        self.countdown.reset();
        AdvanceOutcome::Next {
            index: self.current,
        }
    }

    /// Close whichever question is open.
    pub fn advance(&mut self) -> AdvanceOutcome {
        self.advance_from(self.current)
    }

    /// The submit body for the recorded answers.
    #[must_use]
    pub fn submission(&self) -> Submission {
        Submission {
            assessment_id: self.assessment.id().clone(),
            answers: self.answers.clone(),
        }
    }

    /// Reopen the last question after a rejected submission.
    ///
    /// All answers stay recorded. The last one is also restored as the pending
    /// selection, and the next advance overwrites it with whatever is pending.
    pub fn submit_failed(&mut self) {
        if !self.submitting {
            return;
        }
        self.submitting = false;
        self.selected = self.answers.last().and_then(|last| last.selected);
    }
}

impl fmt::Debug for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttemptState")
            .field("assessment_id", self.assessment.id())
            .field("questions_len", &self.assessment.question_count())
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("remaining", &self.countdown.remaining())
            .field("selected", &self.selected)
            .field("submitting", &self.submitting)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
