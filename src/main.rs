use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use search_study_session::{
    api::{StudyClient, StudyService},
    config::{Config, LogFormat},
    reporter::ProgressReporter,
    server::SessionServer,
    session::ExperimentSession,
};

/// Drive one participant's study session over stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "study-session", version, about)]
struct Cli {
    /// Participant identifier assigned by the study coordinator
    #[arg(long)]
    participant_id: String,

    /// Register the participant and record consent before loading the plan
    #[arg(long)]
    enroll: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        participant_id = %cli.participant_id,
        "Study session starting..."
    );

    // Initialize study API client
    let client = match StudyClient::new(&config.study_api, config.request.clone()) {
        Ok(c) => {
            info!(base_url = %config.study_api.base_url, "Study API client initialized");
            c
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize study API client");
            return Err(e.into());
        }
    };

    if cli.enroll {
        if let Err(e) = enroll(&client, &cli.participant_id).await {
            error!(error = %e, "Failed to enroll participant");
            return Err(e.into());
        }
    }

    let reporter = ProgressReporter::new(cli.participant_id.clone(), Arc::new(client));
    let mut session = ExperimentSession::new(reporter);

    // A failed load leaves the session in its failed phase for the UI to show.
    match session.load_plan().await {
        Ok(view) => info!(
            total_interfaces = view.total_interfaces,
            "Plan loaded, session ready"
        ),
        Err(e) => warn!(error = %e, "Plan could not be loaded"),
    }

    let mut server = SessionServer::new(session);

    if let Err(e) = server.run().await {
        error!(error = %e, "Driver error");
        return Err(e.into());
    }

    info!(
        phase = %server.session().state().phase().kind(),
        "Session driver shutdown complete"
    );
    Ok(())
}

async fn enroll(
    client: &StudyClient,
    participant_id: &str,
) -> search_study_session::error::StudyApiResult<()> {
    let record = client.register_participant(participant_id).await?;
    info!(
        participant_id = %record.participant_id,
        consent_given = record.consent_given,
        "Participant registered"
    );

    if !record.consent_given {
        client.record_consent(participant_id).await?;
        info!(participant_id = %participant_id, "Consent recorded");
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
