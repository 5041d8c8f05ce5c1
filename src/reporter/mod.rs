//! Translates session transitions into study service calls.
//!
//! The reporter owns no session state. It turns each transition the session
//! wants to commit into one call, and classifies a failure as either a
//! missing plan or a failed forward.

use std::sync::Arc;

use tracing::{info, warn};

use crate::api::{QuestionnaireRequest, StudyService, TaskEndRequest, TaskStartRequest};
use crate::error::{SessionError, SessionResult, StudyApiError};
use crate::plan::{ExperimentPlan, InterfaceKind};
use crate::submission::{QuestionnaireSubmission, TaskEndPayload};

/// Adapter between the session state machine and the study service.
#[derive(Clone)]
pub struct ProgressReporter {
    participant_id: String,
    service: Arc<dyn StudyService>,
}

impl ProgressReporter {
    /// Create a reporter for one participant.
    pub fn new(participant_id: impl Into<String>, service: Arc<dyn StudyService>) -> Self {
        Self {
            participant_id: participant_id.into(),
            service,
        }
    }

    /// Participant this reporter speaks for.
    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Fetch and validate the participant's plan.
    pub async fn load_plan(&self) -> SessionResult<ExperimentPlan> {
        let response = self
            .service
            .fetch_plan(&self.participant_id)
            .await
            .map_err(|e| SessionError::PlanUnavailable {
                message: e.to_string(),
            })?;

        if response.consent_given == Some(false) {
            warn!(
                participant_id = %self.participant_id,
                "Plan delivered for a participant without recorded consent"
            );
        }

        let plan = ExperimentPlan::from_response(&self.participant_id, response)?;
        info!(
            participant_id = %self.participant_id,
            interfaces = plan.interface_count(),
            prompts = plan.total_prompts(),
            "Experiment plan loaded"
        );
        Ok(plan)
    }

    /// Report that the participant started a task.
    pub async fn report_task_start(
        &self,
        interface: InterfaceKind,
        task_id: &str,
    ) -> SessionResult<()> {
        let request = TaskStartRequest {
            participant_id: self.participant_id.clone(),
            interface_type: interface,
            task_id: task_id.to_string(),
        };
        self.service
            .start_task(&request)
            .await
            .map(|_| ())
            .map_err(|e| forwarding("task_start", e))
    }

    /// Report a finished task with its finalized submission.
    pub async fn report_task_end(
        &self,
        interface: InterfaceKind,
        task_id: &str,
        submission: TaskEndPayload,
    ) -> SessionResult<()> {
        let request = TaskEndRequest {
            participant_id: self.participant_id.clone(),
            interface_type: interface,
            task_id: task_id.to_string(),
            submission,
        };
        self.service
            .end_task(&request)
            .await
            .map(|_| ())
            .map_err(|e| forwarding("task_end", e))
    }

    /// Forward one questionnaire's responses.
    pub async fn report_questionnaire(
        &self,
        interface: InterfaceKind,
        submission: QuestionnaireSubmission,
    ) -> SessionResult<()> {
        let request = QuestionnaireRequest {
            participant_id: self.participant_id.clone(),
            interface_type: interface,
            questionnaire_type: submission.questionnaire_type,
            responses: submission.responses,
        };
        self.service
            .submit_questionnaire(&request)
            .await
            .map(|_| ())
            .map_err(|e| forwarding("questionnaire", e))
    }
}

fn forwarding(operation: &str, err: StudyApiError) -> SessionError {
    SessionError::ForwardingFailure {
        operation: operation.to_string(),
        retryable: err.is_retryable(),
        message: err.to_string(),
    }
}
