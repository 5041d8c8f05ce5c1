//! End-to-end session tests
//!
//! Drives an ExperimentSession through the real StudyClient against a
//! wiremock study service.

use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

use search_study_session::api::StudyClient;
use search_study_session::config::{RequestConfig, StudyApiConfig};
use search_study_session::error::SessionError;
use search_study_session::plan::InterfaceKind;
use search_study_session::reporter::ProgressReporter;
use search_study_session::session::{ExperimentSession, Phase};
use search_study_session::submission::{
    QuestionnaireSubmission, QuestionnaireType, ResponseValue, TaskAnswer, TaskSubmission,
};

fn create_session(base_url: &str, participant_id: &str) -> ExperimentSession {
    let config = StudyApiConfig {
        base_url: base_url.to_string(),
        api_key: None,
    };
    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries: 0, // No retries for testing
        retry_delay_ms: 10,
    };
    let client = StudyClient::new(&config, request_config).expect("Failed to create client");
    ExperimentSession::new(ProgressReporter::new(participant_id, Arc::new(client)))
}

async fn mount_plan(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/experiment/plan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_logging(server: &MockServer) {
    for endpoint in ["/log/task/start", "/log/task/end"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "logged",
                "log_id": 1
            })))
            .mount(server)
            .await;
    }
    Mock::given(method("POST"))
        .and(path("/questionnaire"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "submitted",
            "questionnaire_id": 1
        })))
        .mount(server)
        .await;
}

fn answer_for(kind: InterfaceKind) -> TaskAnswer {
    match kind {
        InterfaceKind::Faceted => TaskAnswer::Faceted {
            selected_movie_ids: vec![11, 12],
            result_count: 40,
        },
        InterfaceKind::LlmAssist => TaskAnswer::LlmAssist {
            nl_query: "space movies from the 80s".to_string(),
            parsed_query: Some(json!({"genre": "Science Fiction", "year_from": 1980})),
            selected_movie_ids: vec![1891],
            result_count: 7,
            reformulations: 1,
        },
        InterfaceKind::LlmOnly => TaskAnswer::LlmOnly {
            nl_query: "a feel-good comedy".to_string(),
            answer: Some("Try Paddington 2.".to_string()),
            selected_movie_ids: vec![346648],
            result_count: 1,
            reformulations: 0,
        },
    }
}

fn responses_for(kind: QuestionnaireType) -> BTreeMap<String, ResponseValue> {
    let keys: Vec<String> = match kind {
        QuestionnaireType::Sus => (0..10).map(|i| i.to_string()).collect(),
        QuestionnaireType::NasaTlx => [
            "mental_demand",
            "physical_demand",
            "temporal_demand",
            "performance",
            "effort",
            "frustration",
        ]
        .iter()
        .map(|k| k.to_string())
        .collect(),
        QuestionnaireType::Trust => [
            "trust_accuracy",
            "trust_transparency",
            "trust_control",
            "trust_reliability",
            "trust_predictability",
        ]
        .iter()
        .map(|k| k.to_string())
        .collect(),
        QuestionnaireType::Preference => ["ease_of_use", "efficiency", "satisfaction"]
            .iter()
            .map(|k| k.to_string())
            .collect(),
    };
    keys.into_iter()
        .map(|k| (k, ResponseValue::Scale(4)))
        .collect()
}

async fn complete_task(session: &mut ExperimentSession, task_id: &str) {
    let kind = session.view().interface_kind.expect("in an interface");
    session.start_task(task_id).await.unwrap();
    session
        .submit_task(TaskSubmission::new(task_id, answer_for(kind)))
        .await
        .unwrap();
}

async fn complete_questionnaires(session: &mut ExperimentSession) {
    for kind in QuestionnaireType::SEQUENCE {
        session
            .submit_questionnaire(QuestionnaireSubmission::new(kind, responses_for(kind)))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_two_interface_session_runs_to_completion() {
    let mock_server = MockServer::start().await;
    mount_plan(
        &mock_server,
        json!({
            "participant_id": "P01",
            "interface_order": ["faceted", "llm_only"],
            "tasks": {
                "faceted": [
                    {"task_id": "T1", "description": "Find a heist movie"},
                    {"task_id": "T2", "description": "Find a silent film"}
                ],
                "llm_only": [{"task_id": "T3", "description": "Ask for a musical"}]
            }
        }),
    )
    .await;
    mount_logging(&mock_server).await;

    let mut session = create_session(&mock_server.uri(), "P01");
    let view = session.load_plan().await.unwrap();
    assert_eq!(view.task.map(|t| t.task_id), Some("T1".to_string()));

    complete_task(&mut session, "T1").await;
    assert_eq!(
        session.state().phase(),
        Phase::InTask {
            interface_index: 0,
            task_index: 1
        }
    );

    complete_task(&mut session, "T2").await;
    assert_eq!(
        session.state().phase(),
        Phase::InQuestionnaire {
            interface_index: 0,
            questionnaire_index: 0
        }
    );

    complete_questionnaires(&mut session).await;
    assert_eq!(
        session.state().phase(),
        Phase::InTask {
            interface_index: 1,
            task_index: 0
        }
    );

    complete_task(&mut session, "T3").await;
    complete_questionnaires(&mut session).await;

    assert_eq!(session.state().phase(), Phase::Completed);
    assert_eq!(session.accepted_submissions(), 11);
    assert_eq!(
        session.state().completed_interfaces(),
        &[InterfaceKind::Faceted, InterfaceKind::LlmOnly]
    );

    let requests = mock_server.received_requests().await.unwrap();
    let count = |p: &str| requests.iter().filter(|r| r.url.path() == p).count();
    assert_eq!(count("/experiment/plan"), 1);
    assert_eq!(count("/log/task/start"), 3);
    assert_eq!(count("/log/task/end"), 3);
    assert_eq!(count("/questionnaire"), 8);
}

#[tokio::test]
async fn test_plan_missing_tasks_fails_session() {
    let mock_server = MockServer::start().await;
    mount_plan(
        &mock_server,
        json!({
            "participant_id": "P02",
            "interface_order": ["faceted", "llm_only"],
            "tasks": {
                "faceted": [{"task_id": "T1", "description": "Find a heist movie"}]
            }
        }),
    )
    .await;

    let mut session = create_session(&mock_server.uri(), "P02");
    let err = session.load_plan().await.unwrap_err();

    assert!(matches!(err, SessionError::PlanUnavailable { .. }));
    assert_eq!(session.state().phase(), Phase::Failed);
    assert!(session.is_terminal());

    let err = session.start_task("T1").await.unwrap_err();
    assert!(matches!(err, SessionError::ProtocolViolation { .. }));
    assert_eq!(session.state().phase(), Phase::Failed);
}

#[tokio::test]
async fn test_plan_service_down_fails_session() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/experiment/plan"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let mut session = create_session(&mock_server.uri(), "P02");
    let err = session.load_plan().await.unwrap_err();

    assert!(matches!(err, SessionError::PlanUnavailable { .. }));
    assert_eq!(session.state().phase(), Phase::Failed);
}

#[tokio::test]
async fn test_failed_task_end_can_be_resubmitted() {
    let mock_server = MockServer::start().await;
    mount_plan(
        &mock_server,
        json!({
            "participant_id": "P04",
            "interface_order": ["llm_assist"],
            "tasks": {
                "llm_assist": [
                    {"task_id": "A1", "description": "Find a courtroom drama"},
                    {"task_id": "A2", "description": "Find an animated film"}
                ]
            }
        }),
    )
    .await;

    // First task-end attempt fails with a server error, later ones succeed.
    Mock::given(method("POST"))
        .and(path("/log/task/end"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database locked"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_logging(&mock_server).await;

    let mut session = create_session(&mock_server.uri(), "P04");
    session.load_plan().await.unwrap();
    session.start_task("A1").await.unwrap();

    let submission = TaskSubmission::new("A1", answer_for(InterfaceKind::LlmAssist));
    let err = session.submit_task(submission.clone()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::ForwardingFailure {
            retryable: true,
            ..
        }
    ));
    assert_eq!(
        session.state().phase(),
        Phase::InTask {
            interface_index: 0,
            task_index: 0
        }
    );
    assert_eq!(session.accepted_submissions(), 0);

    let view = session.submit_task(submission).await.unwrap();
    assert_eq!(view.task.map(|t| t.task_id), Some("A2".to_string()));
    assert_eq!(
        session.state().phase(),
        Phase::InTask {
            interface_index: 0,
            task_index: 1
        }
    );
    assert_eq!(session.accepted_submissions(), 1);

    let requests = mock_server.received_requests().await.unwrap();
    let ends = requests
        .iter()
        .filter(|r| r.url.path() == "/log/task/end")
        .count();
    assert_eq!(ends, 2);
}

#[tokio::test]
async fn test_rejected_questionnaire_fails_session() {
    let mock_server = MockServer::start().await;
    mount_plan(
        &mock_server,
        json!({
            "participant_id": "P05",
            "interface_order": ["faceted"],
            "tasks": {"faceted": []}
        }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/questionnaire"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Missing required fields"
        })))
        .mount(&mock_server)
        .await;

    let mut session = create_session(&mock_server.uri(), "P05");
    session.load_plan().await.unwrap();

    let err = session
        .submit_questionnaire(QuestionnaireSubmission::new(
            QuestionnaireType::Sus,
            responses_for(QuestionnaireType::Sus),
        ))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::ForwardingFailure {
            retryable: false,
            ..
        }
    ));
    assert_eq!(session.state().phase(), Phase::Failed);
}

#[tokio::test]
async fn test_no_content_acks_advance_session() {
    let mock_server = MockServer::start().await;
    mount_plan(
        &mock_server,
        json!({
            "participant_id": "P06",
            "interface_order": ["faceted"],
            "tasks": {
                "faceted": [{"task_id": "F1", "description": "Find a western"}]
            }
        }),
    )
    .await;
    for endpoint in ["/log/task/start", "/log/task/end", "/questionnaire"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(204))
            .mount(&mock_server)
            .await;
    }

    let mut session = create_session(&mock_server.uri(), "P06");
    session.load_plan().await.unwrap();

    complete_task(&mut session, "F1").await;
    assert_eq!(
        session.state().phase(),
        Phase::InQuestionnaire {
            interface_index: 0,
            questionnaire_index: 0
        }
    );

    complete_questionnaires(&mut session).await;
    assert_eq!(session.state().phase(), Phase::Completed);
    assert_eq!(session.accepted_submissions(), 5);
}

#[tokio::test]
async fn test_rejected_start_can_be_retried() {
    let mock_server = MockServer::start().await;
    mount_plan(
        &mock_server,
        json!({
            "participant_id": "P07",
            "interface_order": ["llm_only"],
            "tasks": {
                "llm_only": [{"task_id": "O1", "description": "Ask for a documentary"}]
            }
        }),
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/log/task/start"))
        .respond_with(ResponseTemplate::new(409).set_body_string("busy"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    mount_logging(&mock_server).await;

    let mut session = create_session(&mock_server.uri(), "P07");
    session.load_plan().await.unwrap();

    let err = session.start_task("O1").await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::ForwardingFailure {
            retryable: false,
            ..
        }
    ));
    assert_eq!(
        session.state().phase(),
        Phase::InTask {
            interface_index: 0,
            task_index: 0
        }
    );

    let view = session.start_task("O1").await.unwrap();
    assert!(view.task_started);
}
