//! Experiment session state machine.
//!
//! An [`ExperimentSession`] walks one participant through their plan: for each
//! interface in order, every task, then the fixed questionnaire battery, and
//! finally completion. Every operation either commits exactly one transition
//! after the study service acknowledged it, or returns a classified
//! [`SessionError`] and leaves the state as it was.
//!
//! ```text
//! LoadingPlan ─▶ InTask(i, t) ─▶ … ─▶ InQuestionnaire(i, q) ─▶ … ─▶ InTask(i+1, 0) ─▶ … ─▶ Completed
//!      │
//!      └──▶ Failed
//! ```

mod clock;
mod state;


pub use clock::{Clock, SystemClock};
pub use state::{CurrentView, Phase, PhaseKind, SessionState, StepPosition};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::plan::{ExperimentPlan, InterfaceKind};
use crate::reporter::ProgressReporter;
use crate::submission::{QuestionnaireSubmission, QuestionnaireType, TaskEndPayload, TaskSubmission};

/// Start timestamp of the task at `(interface_index, task_index)`.
#[derive(Debug, Clone, Copy)]
struct TaskStart {
    interface_index: usize,
    task_index: usize,
    at: DateTime<Utc>,
}

/// One participant's pass through the study protocol.
pub struct ExperimentSession {
    session_id: Uuid,
    reporter: ProgressReporter,
    clock: Arc<dyn Clock>,
    plan: Option<ExperimentPlan>,
    state: SessionState,
    task_start: Option<TaskStart>,
    accepted_submissions: usize,
}

impl ExperimentSession {
    /// Create a session in `LoadingPlan` using the system clock.
    pub fn new(reporter: ProgressReporter) -> Self {
        Self::with_clock(reporter, Arc::new(SystemClock))
    }

    /// Create a session with a custom clock.
    pub fn with_clock(reporter: ProgressReporter, clock: Arc<dyn Clock>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            reporter,
            clock,
            plan: None,
            state: SessionState::default(),
            task_start: None,
            accepted_submissions: 0,
        }
    }

    /// Correlation id used in logs.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Participant this session belongs to.
    pub fn participant_id(&self) -> &str {
        self.reporter.participant_id()
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The plan, once loaded.
    pub fn plan(&self) -> Option<&ExperimentPlan> {
        self.plan.as_ref()
    }

    /// Number of task and questionnaire submissions accepted so far.
    pub fn accepted_submissions(&self) -> usize {
        self.accepted_submissions
    }

    /// Whether the session reached `Completed` or `Failed`.
    pub fn is_terminal(&self) -> bool {
        self.state.phase().is_terminal()
    }

    /// Projection for rendering the current screen.
    pub fn view(&self) -> CurrentView {
        let task_started = match (self.state.phase(), self.task_start) {
            (
                Phase::InTask {
                    interface_index,
                    task_index,
                },
                Some(start),
            ) => start.interface_index == interface_index && start.task_index == task_index,
            _ => false,
        };
        CurrentView::project(&self.state, self.plan.as_ref(), task_started)
    }

    /// Load the participant's plan and move to its first prompt.
    ///
    /// The first successful load is kept for the lifetime of the session;
    /// later calls return the current view without fetching again. A failed
    /// load moves the session to `Failed`.
    pub async fn load_plan(&mut self) -> SessionResult<CurrentView> {
        match self.state.phase() {
            Phase::LoadingPlan => {}
            Phase::Failed => {
                return Err(SessionError::protocol(
                    PhaseKind::LoadingPlan.as_str(),
                    PhaseKind::Failed.as_str(),
                ))
            }
            _ => {
                debug!(session_id = %self.session_id, "Plan already loaded, keeping cached plan");
                return Ok(self.view());
            }
        }

        match self.reporter.load_plan().await {
            Ok(plan) => {
                self.state.begin(&plan);
                self.plan = Some(plan);
                info!(
                    session_id = %self.session_id,
                    participant_id = %self.participant_id(),
                    phase = %self.state.phase().kind(),
                    "Session started"
                );
                Ok(self.view())
            }
            Err(e) => {
                self.state.fail();
                error!(
                    session_id = %self.session_id,
                    participant_id = %self.participant_id(),
                    error = %e,
                    "Plan load failed, session is unusable"
                );
                Err(e)
            }
        }
    }

    /// Signal that the participant started the task in scope.
    ///
    /// Repeated signals for the same task are accepted and keep the first
    /// start time. If the service does not acknowledge the start, nothing is
    /// recorded and the state stays as it was.
    pub async fn start_task(&mut self, task_id: &str) -> SessionResult<CurrentView> {
        let (interface_index, task_index) = self.expect_task_phase()?;
        let (interface, expected_id) = self.task_scope(interface_index, task_index)?;

        if task_id != expected_id {
            return Err(SessionError::protocol(
                format!("start of task '{}'", expected_id),
                format!("start of task '{}'", task_id),
            ));
        }

        if self.recorded_start(interface_index, task_index).is_some() {
            warn!(
                session_id = %self.session_id,
                task_id = %task_id,
                "Duplicate task start ignored"
            );
            return Ok(self.view());
        }

        let at = self.clock.now();
        // A failed start never ends the session.
        if let Err(e) = self
            .reporter
            .report_task_start(interface, &expected_id)
            .await
        {
            warn!(
                session_id = %self.session_id,
                task_id = %expected_id,
                error = %e,
                "Task start not acknowledged, start may be retried"
            );
            return Err(e);
        }

        self.task_start = Some(TaskStart {
            interface_index,
            task_index,
            at,
        });
        info!(
            session_id = %self.session_id,
            interface = %interface,
            task_id = %expected_id,
            "Task started"
        );
        Ok(self.view())
    }

    /// Accept the answer for the task in scope and advance.
    pub async fn submit_task(&mut self, submission: TaskSubmission) -> SessionResult<CurrentView> {
        let (interface_index, task_index) = self.expect_task_phase()?;
        let (interface, expected_id) = self.task_scope(interface_index, task_index)?;

        if submission.task_id != expected_id {
            return Err(SessionError::protocol(
                format!("submission for task '{}'", expected_id),
                format!("submission for task '{}'", submission.task_id),
            ));
        }
        let answered_on = submission.answer.interface_kind();
        if answered_on != interface {
            return Err(SessionError::protocol(
                format!("{} answer", interface),
                format!("{} answer", answered_on),
            ));
        }
        submission.answer.validate()?;

        let started_at = self.recorded_start(interface_index, task_index);
        if started_at.is_none() {
            warn!(
                session_id = %self.session_id,
                interface = %interface,
                task_id = %expected_id,
                "Task submitted without a recorded start"
            );
        }
        let payload = TaskEndPayload::finalize(submission.answer, started_at, self.clock.now());
        let duration_ms = payload.task_duration_ms;

        if let Err(e) = self
            .reporter
            .report_task_end(interface, &expected_id, payload)
            .await
        {
            return Err(self.forwarding_failed(e));
        }

        self.task_start = None;
        self.accepted_submissions += 1;
        if let Some(plan) = self.plan.as_ref() {
            self.state.advance_after_task(plan);
        }
        info!(
            session_id = %self.session_id,
            interface = %interface,
            task_id = %expected_id,
            duration_ms = ?duration_ms,
            phase = %self.state.phase().kind(),
            "Task completed"
        );
        Ok(self.view())
    }

    /// Accept the questionnaire in scope and advance.
    pub async fn submit_questionnaire(
        &mut self,
        submission: QuestionnaireSubmission,
    ) -> SessionResult<CurrentView> {
        let (interface_index, questionnaire_index) = match self.state.phase() {
            Phase::InQuestionnaire {
                interface_index,
                questionnaire_index,
            } => (interface_index, questionnaire_index),
            other => {
                return Err(SessionError::protocol(
                    PhaseKind::InQuestionnaire.as_str(),
                    other.kind().as_str(),
                ))
            }
        };
        let interface = self.interface_at(interface_index)?;
        let expected = QuestionnaireType::at(questionnaire_index).ok_or_else(|| {
            SessionError::protocol(
                "a questionnaire in the battery",
                format!("questionnaire #{}", questionnaire_index + 1),
            )
        })?;

        if submission.questionnaire_type != expected {
            return Err(SessionError::protocol(
                format!("{} questionnaire", expected),
                format!("{} questionnaire", submission.questionnaire_type),
            ));
        }
        submission.validate()?;

        if let Err(e) = self
            .reporter
            .report_questionnaire(interface, submission)
            .await
        {
            return Err(self.forwarding_failed(e));
        }

        self.accepted_submissions += 1;
        if let Some(plan) = self.plan.as_ref() {
            self.state.advance_after_questionnaire(plan);
        }
        info!(
            session_id = %self.session_id,
            interface = %interface,
            questionnaire = %expected,
            phase = %self.state.phase().kind(),
            "Questionnaire submitted"
        );
        if self.state.phase() == Phase::Completed {
            info!(
                session_id = %self.session_id,
                participant_id = %self.participant_id(),
                submissions = self.accepted_submissions,
                "Study completed"
            );
        }
        Ok(self.view())
    }

    fn expect_task_phase(&self) -> SessionResult<(usize, usize)> {
        match self.state.phase() {
            Phase::InTask {
                interface_index,
                task_index,
            } => Ok((interface_index, task_index)),
            other => Err(SessionError::protocol(
                PhaseKind::InTask.as_str(),
                other.kind().as_str(),
            )),
        }
    }

    fn interface_at(&self, interface_index: usize) -> SessionResult<InterfaceKind> {
        self.plan
            .as_ref()
            .and_then(|plan| plan.interface_at(interface_index))
            .ok_or_else(|| {
                SessionError::protocol(
                    "a loaded plan",
                    format!("no interface at position {}", interface_index),
                )
            })
    }

    fn task_scope(
        &self,
        interface_index: usize,
        task_index: usize,
    ) -> SessionResult<(InterfaceKind, String)> {
        let interface = self.interface_at(interface_index)?;
        let task = self
            .plan
            .as_ref()
            .and_then(|plan| plan.task_at(interface_index, task_index))
            .ok_or_else(|| {
                SessionError::protocol(
                    "a planned task",
                    format!("no task at position {}", task_index),
                )
            })?;
        Ok((interface, task.task_id.clone()))
    }

    fn recorded_start(&self, interface_index: usize, task_index: usize) -> Option<DateTime<Utc>> {
        self.task_start
            .filter(|s| s.interface_index == interface_index && s.task_index == task_index)
            .map(|s| s.at)
    }

    /// Apply the failure policy for a rejected task-end or questionnaire forward.
    fn forwarding_failed(&mut self, err: SessionError) -> SessionError {
        if err.is_retryable() {
            warn!(
                session_id = %self.session_id,
                error = %err,
                "Forwarding failed, state unchanged, submission may be retried"
            );
        } else {
            self.state.fail();
            error!(
                session_id = %self.session_id,
                error = %err,
                "Forwarding rejected by study service, session failed"
            );
        }
        err
    }
}
