use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{
    LogAck, ParticipantRecord, ParticipantRequest, PlanResponse, QuestionnaireAck,
    QuestionnaireRequest, TaskEndRequest, TaskStartRequest,
};
use super::StudyService;
use crate::config::{RequestConfig, StudyApiConfig};
use crate::error::{StudyApiError, StudyApiResult};

/// HTTP client for the study planning and logging service
#[derive(Clone)]
pub struct StudyClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    request_config: RequestConfig,
}

impl StudyClient {
    /// Create a new study service client
    pub fn new(config: &StudyApiConfig, request_config: RequestConfig) -> StudyApiResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(StudyApiError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request built by `build`, retrying transient failures with
    /// exponential backoff. Returns the body of the first 2xx reply.
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> StudyApiResult<String>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = backoff_delay(self.request_config.retry_delay_ms, retries);
                warn!(
                    operation = %operation,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying study API request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(build()).await {
                Ok(response) => {
                    info!(
                        operation = %operation,
                        latency_ms = start.elapsed().as_millis(),
                        "Study API call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    error!(
                        operation = %operation,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Study API call failed"
                    );
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(StudyApiError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, request: RequestBuilder) -> StudyApiResult<String> {
        let request = match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StudyApiError::Timeout {
                    timeout_ms: self.request_config.timeout_ms,
                }
            } else {
                StudyApiError::Http(e)
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(StudyApiError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        response.text().await.map_err(StudyApiError::Http)
    }

    /// Fetch a resource whose body must parse.
    async fn fetch<T, F>(&self, operation: &str, build: F) -> StudyApiResult<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let body = self.send_with_retry(operation, build).await?;
        serde_json::from_str(&body).map_err(|e| StudyApiError::InvalidResponse {
            message: format!("Failed to parse response: {}", e),
        })
    }

    /// Post a write whose 2xx status is the acknowledgment. A missing or
    /// unreadable body yields the default ack.
    async fn acknowledge<T, F>(&self, operation: &str, build: F) -> StudyApiResult<T>
    where
        T: DeserializeOwned + Default,
        F: Fn() -> RequestBuilder,
    {
        let body = self.send_with_retry(operation, build).await?;
        if body.trim().is_empty() {
            return Ok(T::default());
        }
        Ok(serde_json::from_str(&body).unwrap_or_else(|e| {
            warn!(
                operation = %operation,
                error = %e,
                "Acknowledged without a readable body"
            );
            T::default()
        }))
    }

    fn post_json<B: serde::Serialize>(&self, path: &str, body: &B) -> RequestBuilder {
        self.client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .json(body)
    }
}

/// Delay before retry number `retry` (1-based): `base_ms * 2^(retry - 1)`,
/// saturating instead of overflowing.
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    Duration::from_millis(base_ms.saturating_mul(2_u64.saturating_pow(retry.saturating_sub(1))))
}

#[async_trait]
impl StudyService for StudyClient {
    async fn fetch_plan(&self, participant_id: &str) -> StudyApiResult<PlanResponse> {
        debug!(participant_id = %participant_id, "Fetching experiment plan");
        let url = self.url("/experiment/plan");
        self.fetch("fetch_plan", || {
            self.client
                .get(&url)
                .query(&[("participant_id", participant_id)])
        })
        .await
    }

    async fn start_task(&self, request: &TaskStartRequest) -> StudyApiResult<LogAck> {
        debug!(
            participant_id = %request.participant_id,
            interface = %request.interface_type,
            task_id = %request.task_id,
            "Logging task start"
        );
        self.acknowledge("task_start", || self.post_json("/log/task/start", request))
            .await
    }

    async fn end_task(&self, request: &TaskEndRequest) -> StudyApiResult<LogAck> {
        debug!(
            participant_id = %request.participant_id,
            interface = %request.interface_type,
            task_id = %request.task_id,
            duration_ms = ?request.submission.task_duration_ms,
            "Logging task end"
        );
        self.acknowledge("task_end", || self.post_json("/log/task/end", request))
            .await
    }

    async fn submit_questionnaire(
        &self,
        request: &QuestionnaireRequest,
    ) -> StudyApiResult<QuestionnaireAck> {
        debug!(
            participant_id = %request.participant_id,
            interface = %request.interface_type,
            questionnaire = %request.questionnaire_type,
            items = request.responses.len(),
            "Submitting questionnaire"
        );
        self.acknowledge("questionnaire", || self.post_json("/questionnaire", request))
            .await
    }

    async fn register_participant(
        &self,
        participant_id: &str,
    ) -> StudyApiResult<ParticipantRecord> {
        let body = ParticipantRequest {
            participant_id: participant_id.to_string(),
        };
        self.fetch("register_participant", || {
            self.post_json("/experiment/participant", &body)
        })
        .await
    }

    async fn record_consent(&self, participant_id: &str) -> StudyApiResult<ParticipantRecord> {
        let body = ParticipantRequest {
            participant_id: participant_id.to_string(),
        };
        let record: ParticipantRecord = self
            .fetch("record_consent", || self.post_json("/experiment/consent", &body))
            .await?;
        info!(participant_id = %record.participant_id, "Consent recorded");
        Ok(record)
    }
}
