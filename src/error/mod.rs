use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Study API error: {0}")]
    StudyApi(#[from] StudyApiError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),
}

/// Errors raised by the study logging/planning service boundary
#[derive(Debug, Error)]
pub enum StudyApiError {
    #[error("Study API unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StudyApiError {
    /// Whether repeating the same request could succeed.
    ///
    /// Transport failures, timeouts, 5xx, 408 and 429 are transient. Any other
    /// status means the service rejected the payload itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            StudyApiError::Unavailable { .. } | StudyApiError::Timeout { .. } => true,
            StudyApiError::Api { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            StudyApiError::InvalidResponse { .. } => false,
            StudyApiError::Http(e) => !e.is_builder() && !e.is_decode(),
        }
    }
}

/// Classified failures of the session state machine's public operations.
///
/// `PlanUnavailable` is fatal for the session. The others leave the session
/// state untouched unless a forwarding failure is marked non-retryable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Experiment plan unavailable: {message}")]
    PlanUnavailable { message: String },

    #[error("Protocol violation: expected {expected}, session is {actual}")]
    ProtocolViolation { expected: String, actual: String },

    #[error("Forwarding {operation} failed: {message}")]
    ForwardingFailure {
        operation: String,
        message: String,
        retryable: bool,
    },

    #[error("Invalid submission: {field} - {reason}")]
    InvalidSubmission { field: String, reason: String },
}

impl SessionError {
    /// Short machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::PlanUnavailable { .. } => "plan_unavailable",
            SessionError::ProtocolViolation { .. } => "protocol_violation",
            SessionError::ForwardingFailure { .. } => "forwarding_failure",
            SessionError::InvalidSubmission { .. } => "invalid_submission",
        }
    }

    /// Whether the caller may resubmit the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::ForwardingFailure {
                retryable: true,
                ..
            }
        )
    }

    pub(crate) fn protocol(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        SessionError::ProtocolViolation {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::InvalidSubmission {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors of the stdio JSON-RPC driver
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for study API operations
pub type StudyApiResult<T> = Result<T, StudyApiError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;
