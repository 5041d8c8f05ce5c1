//! # Search Study Session
//!
//! Session core for a within-subjects user study comparing three movie-search
//! interfaces: a faceted search form, an LLM-assisted query builder and an
//! LLM-only conversational search.
//!
//! A participant receives a plan (interface order plus tasks per interface),
//! then works through each interface's tasks followed by four questionnaires
//! (SUS, NASA-TLX, trust, preference). The session tracks the current step,
//! forwards each start and submission to the study service, and exposes a
//! projection the UI renders from.
//!
//! ## Architecture
//!
//! ```text
//! UI process → stdio JSON-RPC (Rust) → ExperimentSession → Study API (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use search_study_session::{Config, ExperimentSession, ProgressReporter, SessionServer, StudyClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let client = StudyClient::new(&config.study_api, config.request.clone())?;
//!     let reporter = ProgressReporter::new("P01", Arc::new(client));
//!     let mut session = ExperimentSession::new(reporter);
//!     session.load_plan().await?;
//!     SessionServer::new(session).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Study service boundary and its HTTP client.
pub mod api;
/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Experiment plan: interface order and tasks.
pub mod plan;
/// Forwards session progress to the study service.
pub mod reporter;
/// Stdio JSON-RPC driver for a session.
pub mod server;
/// Session state machine and UI projection.
pub mod session;
/// Task answers and questionnaire responses.
pub mod submission;

pub use api::{StudyClient, StudyService};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use reporter::ProgressReporter;
pub use server::SessionServer;
pub use session::ExperimentSession;
