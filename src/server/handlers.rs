use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::rpc::{
    JsonRpcResponse, FORWARDING_FAILURE, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    INVALID_SUBMISSION, METHOD_NOT_FOUND, PLAN_UNAVAILABLE, PROTOCOL_VIOLATION,
};
use crate::error::{AppError, AppResult, RpcError, SessionError};
use crate::session::{CurrentView, ExperimentSession};
use crate::submission::{QuestionnaireSubmission, TaskSubmission};

/// Parameters for `session/start_task`.
#[derive(Debug, Deserialize)]
pub struct StartTaskParams {
    /// Task the participant started.
    pub task_id: String,
}

/// Result of `session/view`.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot {
    /// Log correlation id.
    pub session_id: String,
    /// Participant identifier.
    pub participant_id: String,
    /// Submissions accepted so far.
    pub accepted_submissions: usize,
    /// Projection to render.
    pub view: CurrentView,
}

/// Route a method call to the session.
pub async fn dispatch(
    session: &mut ExperimentSession,
    method: &str,
    params: Option<Value>,
) -> AppResult<Value> {
    info!(method = %method, "Routing session call");

    let view = match method {
        "ping" => return Ok(json!({})),
        "session/view" => {
            let snapshot = SessionSnapshot {
                session_id: session.session_id().to_string(),
                participant_id: session.participant_id().to_string(),
                accepted_submissions: session.accepted_submissions(),
                view: session.view(),
            };
            return Ok(serde_json::to_value(snapshot).map_err(RpcError::Json)?);
        }
        "session/load_plan" => session.load_plan().await?,
        "session/start_task" => {
            let params: StartTaskParams = parse_params(method, params)?;
            session.start_task(&params.task_id).await?
        }
        "session/submit_task" => {
            let submission: TaskSubmission = parse_params(method, params)?;
            session.submit_task(submission).await?
        }
        "session/submit_questionnaire" => {
            let submission: QuestionnaireSubmission = parse_params(method, params)?;
            session.submit_questionnaire(submission).await?
        }
        _ => {
            return Err(RpcError::UnknownMethod {
                method: method.to_string(),
            }
            .into())
        }
    };

    Ok(serde_json::to_value(view).map_err(RpcError::Json)?)
}

fn parse_params<T: DeserializeOwned>(method: &str, params: Option<Value>) -> Result<T, RpcError> {
    let params = params.ok_or_else(|| RpcError::InvalidParameters {
        method: method.to_string(),
        message: "params required".to_string(),
    })?;
    serde_json::from_value(params).map_err(|e| RpcError::InvalidParameters {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Build the JSON-RPC error response for a failed call.
pub fn error_response(id: Option<Value>, err: &AppError) -> JsonRpcResponse {
    match err {
        AppError::Session(session_err) => {
            let code = match session_err {
                SessionError::PlanUnavailable { .. } => PLAN_UNAVAILABLE,
                SessionError::ProtocolViolation { .. } => PROTOCOL_VIOLATION,
                SessionError::ForwardingFailure { .. } => FORWARDING_FAILURE,
                SessionError::InvalidSubmission { .. } => INVALID_SUBMISSION,
            };
            JsonRpcResponse::error_with_data(
                id,
                code,
                session_err.to_string(),
                Some(json!({
                    "kind": session_err.kind(),
                    "retryable": session_err.is_retryable(),
                })),
            )
        }
        AppError::Rpc(RpcError::UnknownMethod { method }) => {
            JsonRpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {}", method))
        }
        AppError::Rpc(RpcError::InvalidRequest { .. }) => {
            JsonRpcResponse::error(id, INVALID_REQUEST, err.to_string())
        }
        AppError::Rpc(RpcError::InvalidParameters { .. }) => {
            JsonRpcResponse::error(id, INVALID_PARAMS, err.to_string())
        }
        other => JsonRpcResponse::error(id, INTERNAL_ERROR, other.to_string()),
    }
}
