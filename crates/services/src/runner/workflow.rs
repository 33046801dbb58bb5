use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use assess_core::model::{Answer, AssessmentId};
use assess_core::{Clock, TickOutcome};
use backend::{AssessmentBackend, Submission, SubmissionReceipt};

use super::attempt::{AdvanceOutcome, AttemptState};
use super::timer::CountdownHandle;
use super::view::{RunnerEvent, RunnerPhase, RunnerSnapshot, Termination};
use crate::error::{LoadFailure, RunnerError, SubmitFailure};

const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Result of a user-triggered advance.
#[derive(Debug, Clone, PartialEq)]
pub enum Advanced {
    /// Another trigger already closed the question, or a submission is in flight.
    Ignored,
    /// The question at `index` is now open.
    Next { index: usize },
    /// The last question was closed and the backend accepted the answers.
    Submitted(SubmissionReceipt),
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    User,
    Expired,
}

enum Step {
    Ignored,
    Moved(usize),
    Submit(Submission),
}

struct RunnerInner {
    phase: RunnerPhase,
    assessment_id: Option<AssessmentId>,
    attempt: Option<AttemptState>,
    timer: Option<CountdownHandle>,
    fetch_in_flight: bool,
    error: Option<String>,
}

struct Shared {
    backend: Arc<dyn AssessmentBackend>,
    clock: Clock,
    inner: Mutex<RunnerInner>,
    snapshots: watch::Sender<RunnerSnapshot>,
    events: mpsc::UnboundedSender<RunnerEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, RunnerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &RunnerInner) {
        self.snapshots.send_replace(RunnerSnapshot::capture(
            inner.phase,
            inner.assessment_id.as_ref(),
            inner.attempt.as_ref(),
            inner.error.as_deref(),
        ));
    }

    fn emit(&self, event: RunnerEvent) {
        if self.events.send(event).is_err() {
            debug!("runner event dropped; host stopped listening");
        }
    }
}

/// Drives one timed assessment attempt from load to submission.
///
/// Cloning yields another handle to the same run. All state transitions
/// happen under a single lock that is never held across a backend call, so
/// the countdown and user intents are serialized: whichever closes a
/// question first wins and the other sees the moved index.
#[derive(Clone)]
pub struct AssessmentRunner {
    shared: Arc<Shared>,
}

impl AssessmentRunner {
    /// Create an idle runner in the `Loading` phase.
    ///
    /// The receiver delivers navigation and error signals for the host.
    #[must_use]
    pub fn new(
        backend: Arc<dyn AssessmentBackend>,
        clock: Clock,
    ) -> (Self, mpsc::UnboundedReceiver<RunnerEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(RunnerSnapshot::loading(None));
        let shared = Arc::new(Shared {
            backend,
            clock,
            inner: Mutex::new(RunnerInner {
                phase: RunnerPhase::Loading,
                assessment_id: None,
                attempt: None,
                timer: None,
                fetch_in_flight: false,
                error: None,
            }),
            snapshots,
            events,
        });
        (Self { shared }, receiver)
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> RunnerSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Receive every published state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunnerSnapshot> {
        self.shared.snapshots.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> RunnerPhase {
        self.shared.lock().phase
    }

    /// Answers recorded so far, in question order.
    #[must_use]
    pub fn answers(&self) -> Vec<Answer> {
        self.shared
            .lock()
            .attempt
            .as_ref()
            .map(|a| a.answers().to_vec())
            .unwrap_or_default()
    }

    /// Whether a countdown task is currently armed.
    #[must_use]
    pub fn has_countdown(&self) -> bool {
        self.shared.lock().timer.is_some()
    }

    /// Fetch the assessment and open its first question.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::AlreadyStarted` if a fetch is outstanding or the
    /// run has left `Loading`, `RunnerError::Load` if the fetch fails (the run
    /// is then over), and `RunnerError::Cancelled` if the run was abandoned
    /// while the fetch was in flight.
    pub async fn start(&self, assessment_id: AssessmentId) -> Result<(), RunnerError> {
        {
            let mut inner = self.shared.lock();
            match inner.phase {
                RunnerPhase::Loading if !inner.fetch_in_flight => {}
                RunnerPhase::Terminal(Termination::Abandoned) => {
                    return Err(RunnerError::Cancelled);
                }
                _ => return Err(RunnerError::AlreadyStarted),
            }
            inner.fetch_in_flight = true;
            inner.assessment_id = Some(assessment_id.clone());
            self.shared.publish(&inner);
        }

        info!(assessment_id = %assessment_id, "loading assessment");
        let fetched = self.shared.backend.fetch_assessment(&assessment_id).await;

        let mut inner = self.shared.lock();
        inner.fetch_in_flight = false;
        if inner.phase != RunnerPhase::Loading {
            debug!(assessment_id = %assessment_id, "fetch resolved after cancellation; ignoring");
            return Err(RunnerError::Cancelled);
        }

        match fetched {
            Ok(assessment) => {
                info!(
                    assessment_id = %assessment_id,
                    questions = assessment.question_count(),
                    "assessment loaded"
                );
                inner.attempt = Some(AttemptState::new(assessment, self.shared.clock.now()));
                inner.phase = RunnerPhase::InProgress;
                self.arm_countdown(&mut inner);
                self.shared.publish(&inner);
                Ok(())
            }
            Err(err) => {
                let failure = LoadFailure::from(err);
                warn!(assessment_id = %assessment_id, error = %failure, "assessment load failed");
                let message = failure.message();
                inner.phase = RunnerPhase::Terminal(Termination::Failure);
                inner.error = Some(message.clone());
                self.shared.publish(&inner);
                drop(inner);
                self.shared.emit(RunnerEvent::NavigateBack { message });
                Err(failure.into())
            }
        }
    }

    /// Set the pending selection on the open question.
    ///
    /// Returns `false` when the run is not in progress or the index is out of
    /// range; such intents are dropped silently.
    pub fn select(&self, option: usize) -> bool {
        let mut inner = self.shared.lock();
        if inner.phase != RunnerPhase::InProgress {
            return false;
        }
        let applied = inner
            .attempt
            .as_mut()
            .is_some_and(|attempt| attempt.select(option));
        if applied {
            self.shared.publish(&inner);
        } else {
            debug!(option, "selection ignored");
        }
        applied
    }

    /// Close whichever question is open.
    ///
    /// On the last question this submits and waits for the backend. After a
    /// failed submission, calling it again retries with the same answers.
    ///
    /// # Errors
    ///
    /// Returns `RunnerError::Submit` if the backend rejects the answers,
    /// `RunnerError::NotStarted` before the assessment is loaded and
    /// `RunnerError::Finished`/`Cancelled` once the run is over.
    pub async fn advance(&self) -> Result<Advanced, RunnerError> {
        self.advance_with(None).await
    }

    /// Close question `expected` if it is still the open one.
    ///
    /// Hosts pass the index they rendered so a late tap cannot close the
    /// following question.
    ///
    /// # Errors
    ///
    /// Same as [`AssessmentRunner::advance`].
    pub async fn advance_from(&self, expected: usize) -> Result<Advanced, RunnerError> {
        self.advance_with(Some(expected)).await
    }

    async fn advance_with(&self, expected: Option<usize>) -> Result<Advanced, RunnerError> {
        let submission = {
            let mut inner = self.shared.lock();
            match self.advance_locked(&mut inner, expected, Trigger::User)? {
                Step::Ignored => return Ok(Advanced::Ignored),
                Step::Moved(index) => return Ok(Advanced::Next { index }),
                Step::Submit(submission) => submission,
            }
        };
        self.submit(submission).await.map(Advanced::Submitted)
    }

    /// Abandon the run: stop the countdown and drop all recorded answers.
    ///
    /// Nothing is sent to the backend. Calls still in flight are ignored when
    /// they resolve. No effect once the run has ended.
    pub fn cancel(&self) {
        let mut inner = self.shared.lock();
        if inner.phase.is_terminal() {
            return;
        }
        info!(
            assessment_id = ?inner.assessment_id,
            answered = inner.attempt.as_ref().map_or(0, |a| a.answers().len()),
            "assessment abandoned"
        );
        inner.timer = None;
        inner.attempt = None;
        inner.error = None;
        inner.phase = RunnerPhase::Terminal(Termination::Abandoned);
        self.shared.publish(&inner);
    }

    fn advance_locked(
        &self,
        inner: &mut RunnerInner,
        expected: Option<usize>,
        trigger: Trigger,
    ) -> Result<Step, RunnerError> {
        match inner.phase {
            RunnerPhase::InProgress => {}
            RunnerPhase::Submitting => return Ok(Step::Ignored),
            RunnerPhase::Loading => return Err(RunnerError::NotStarted),
            RunnerPhase::Terminal(Termination::Abandoned) => return Err(RunnerError::Cancelled),
            RunnerPhase::Terminal(_) => return Err(RunnerError::Finished),
        }

        let Some(attempt) = inner.attempt.as_mut() else {
            return Err(RunnerError::NotStarted);
        };
        let closing = expected.unwrap_or_else(|| attempt.current_index());
        let selected = attempt.selected();

        match attempt.advance_from(closing) {
            AdvanceOutcome::Ignored => {
                debug!(question_index = closing, ?trigger, "advance ignored");
                Ok(Step::Ignored)
            }
            AdvanceOutcome::Next { index } => {
                info!(question_index = closing, ?selected, ?trigger, "question closed");
                self.arm_countdown(inner);
                self.shared.publish(inner);
                Ok(Step::Moved(index))
            }
            AdvanceOutcome::ReadyToSubmit => {
                info!(question_index = closing, ?selected, ?trigger, "last question closed");
                let submission = attempt.submission();
                inner.timer = None;
                inner.error = None;
                inner.phase = RunnerPhase::Submitting;
                self.shared.publish(inner);
                Ok(Step::Submit(submission))
            }
        }
    }

    async fn submit(&self, submission: Submission) -> Result<SubmissionReceipt, RunnerError> {
        info!(
            assessment_id = %submission.assessment_id,
            answers = submission.answers.len(),
            "submitting answers"
        );
        let result = self.shared.backend.submit_assessment(&submission).await;

        let mut inner = self.shared.lock();
        if inner.phase != RunnerPhase::Submitting {
            debug!(
                assessment_id = %submission.assessment_id,
                "submit resolved after cancellation; ignoring"
            );
            return Err(RunnerError::Cancelled);
        }

        match result {
            Ok(receipt) => {
                info!(
                    assessment_id = %submission.assessment_id,
                    score = receipt.score,
                    elapsed_secs = inner
                        .attempt
                        .as_ref()
                        .map(|a| (self.shared.clock.now() - a.started_at()).num_seconds()),
                    "assessment submitted"
                );
                inner.phase = RunnerPhase::Terminal(Termination::Success);
                self.shared.publish(&inner);
                drop(inner);
                self.shared.emit(RunnerEvent::ShowReport {
                    assessment_id: submission.assessment_id,
                    receipt: receipt.clone(),
                });
                Ok(receipt)
            }
            Err(err) => {
                let failure = SubmitFailure::from(err);
                warn!(
                    assessment_id = %submission.assessment_id,
                    error = %failure,
                    "submission failed; answers kept for retry"
                );
                let message = failure.message();
                if let Some(attempt) = inner.attempt.as_mut() {
                    attempt.submit_failed();
                }
                inner.phase = RunnerPhase::InProgress;
                inner.error = Some(message.clone());
                self.shared.publish(&inner);
                drop(inner);
                self.shared.emit(RunnerEvent::SubmitFailed { message });
                Err(failure.into())
            }
        }
    }

    /// Replace the countdown with a fresh one for the open question.
    fn arm_countdown(&self, inner: &mut RunnerInner) {
        let Some(index) = inner.attempt.as_ref().map(AttemptState::current_index) else {
            return;
        };
        let shared = Arc::downgrade(&self.shared);
        inner.timer = Some(CountdownHandle::spawn(TICK_PERIOD, move || {
            on_tick(&shared, index)
        }));
    }
}

/// One countdown second for question `index`.
///
/// On expiry the question is closed under the same lock as the tick; the
/// submission, if any, runs on its own task so it outlives this countdown.
fn on_tick(shared: &Weak<Shared>, index: usize) -> ControlFlow<()> {
    let Some(shared) = shared.upgrade() else {
        return ControlFlow::Break(());
    };
    let runner = AssessmentRunner { shared };

    let submission = {
        let mut inner = runner.shared.lock();
        if inner.phase != RunnerPhase::InProgress {
            return ControlFlow::Break(());
        }
        let Some(attempt) = inner.attempt.as_mut() else {
            return ControlFlow::Break(());
        };
        if attempt.current_index() != index {
            return ControlFlow::Break(());
        }

        match attempt.tick() {
            TickOutcome::Running { .. } => {
                runner.shared.publish(&inner);
                return ControlFlow::Continue(());
            }
            TickOutcome::Idle => return ControlFlow::Break(()),
            TickOutcome::Expired => {
                runner.shared.publish(&inner);
                match runner.advance_locked(&mut inner, Some(index), Trigger::Expired) {
                    Ok(Step::Submit(submission)) => submission,
                    Ok(Step::Ignored | Step::Moved(_)) | Err(_) => return ControlFlow::Break(()),
                }
            }
        }
    };

    tokio::spawn(async move {
        if let Err(err) = runner.submit(submission).await {
            debug!(error = %err, "submission after timeout did not complete");
        }
    });
    ControlFlow::Break(())
}

impl std::fmt::Debug for AssessmentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("AssessmentRunner")
            .field("phase", &inner.phase)
            .field("assessment_id", &inner.assessment_id)
            .field("attempt", &inner.attempt)
            .field("countdown_armed", &inner.timer.is_some())
            .finish_non_exhaustive()
    }
}
