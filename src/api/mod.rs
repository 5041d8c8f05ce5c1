//! Boundary to the study's planning and logging service.
//!
//! [`StudyService`] is the seam the session core talks through; [`StudyClient`]
//! is its HTTP implementation.

mod client;
mod types;

pub use client::StudyClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::StudyApiResult;

/// Calls the session core makes against the external study service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StudyService: Send + Sync {
    /// Fetch the participant's experiment plan.
    async fn fetch_plan(&self, participant_id: &str) -> StudyApiResult<PlanResponse>;

    /// Log that a task was started.
    async fn start_task(&self, request: &TaskStartRequest) -> StudyApiResult<LogAck>;

    /// Log a finished task with its submission.
    async fn end_task(&self, request: &TaskEndRequest) -> StudyApiResult<LogAck>;

    /// Store one questionnaire's responses.
    async fn submit_questionnaire(
        &self,
        request: &QuestionnaireRequest,
    ) -> StudyApiResult<QuestionnaireAck>;

    /// Create the participant record, or fetch it if it exists.
    async fn register_participant(&self, participant_id: &str)
        -> StudyApiResult<ParticipantRecord>;

    /// Record that the participant consented.
    async fn record_consent(&self, participant_id: &str) -> StudyApiResult<ParticipantRecord>;
}
