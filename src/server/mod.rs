//! Stdio driver for an experiment session.
//!
//! An external UI process writes one JSON-RPC 2.0 request per line to stdin
//! and reads one response per line from stdout. Every call goes to the single
//! [`ExperimentSession`] owned by the server, one at a time.

mod handlers;
mod rpc;

#[cfg(test)]
#[path = "server_tests.rs"]
mod server_tests;

pub use handlers::{dispatch, error_response, SessionSnapshot, StartTaskParams};
pub use rpc::*;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, RpcError};
use crate::session::ExperimentSession;

/// JSON-RPC server wrapping one session.
pub struct SessionServer {
    session: ExperimentSession,
}

impl SessionServer {
    /// Create a server for a session.
    pub fn new(session: ExperimentSession) -> Self {
        Self { session }
    }

    /// The served session.
    pub fn session(&self) -> &ExperimentSession {
        &self.session
    }

    /// Run over process stdin/stdout until EOF.
    pub async fn run(&mut self) -> std::io::Result<()> {
        info!(
            participant_id = %self.session.participant_id(),
            "Session driver listening on stdin"
        );
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.serve(stdin, stdout).await
    }

    /// Serve line-delimited requests from `reader`, answering on `writer`.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;

            // EOF reached
            if bytes_read == 0 {
                info!("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if let Some(response) = self.handle_line(trimmed).await {
                let response_json = serde_json::to_string(&response)?;
                debug!(response = %response_json, "Sending response");

                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        if !self.session.is_terminal() {
            warn!(
                participant_id = %self.session.participant_id(),
                phase = %self.session.state().phase().kind(),
                "Driver closed before the session finished"
            );
        }
        Ok(())
    }

    /// Handle one raw request line. Returns None for notifications.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        debug!(request = %line, "Received request");

        match serde_json::from_str::<JsonRpcRequest>(line) {
            Ok(request) => self.handle_request(request).await,
            Err(e) => {
                error!(error = %e, "Failed to parse request");
                Some(JsonRpcResponse::error(
                    None,
                    PARSE_ERROR,
                    format!("Parse error: {}", e),
                ))
            }
        }
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            let err: AppError = RpcError::InvalidRequest {
                message: format!("unsupported jsonrpc version '{}'", request.jsonrpc),
            }
            .into();
            warn!(error = %err, "Rejecting request");
            return Some(error_response(request.id, &err));
        }

        let is_notification = request.id.is_none();
        let outcome = dispatch(&mut self.session, &request.method, request.params).await;

        match outcome {
            Ok(result) if !is_notification => Some(JsonRpcResponse::success(request.id, result)),
            Ok(_) => None,
            Err(e) => {
                warn!(method = %request.method, error = %e, "Session call rejected");
                if is_notification {
                    None
                } else {
                    Some(error_response(request.id, &e))
                }
            }
        }
    }
}
