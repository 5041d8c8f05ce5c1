//! Unit tests for the stdio session driver.

use super::*;
use crate::api::{MockStudyService, PlanResponse, QuestionnaireAck};
use crate::reporter::ProgressReporter;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

fn single_block_service() -> MockStudyService {
    let mut service = MockStudyService::new();
    service.expect_fetch_plan().returning(|_| {
        let mut tasks = HashMap::new();
        tasks.insert("faceted".to_string(), vec![]);
        Ok(PlanResponse {
            participant_id: Some("P09".to_string()),
            interface_order: vec!["faceted".to_string()],
            tasks,
            consent_given: Some(true),
        })
    });
    service.expect_submit_questionnaire().returning(|_| {
        Ok(QuestionnaireAck {
            status: "submitted".to_string(),
            questionnaire_id: Some(1),
        })
    });
    service
}

fn server(service: MockStudyService) -> SessionServer {
    let reporter = ProgressReporter::new("P09", Arc::new(service));
    SessionServer::new(ExperimentSession::new(reporter))
}

fn to_value(response: Option<JsonRpcResponse>) -> Value {
    serde_json::to_value(response.expect("response expected")).unwrap()
}

#[tokio::test]
async fn test_ping() {
    let mut server = server(MockStudyService::new());
    let value = to_value(
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .await,
    );
    assert_eq!(value["result"], json!({}));
}

#[tokio::test]
async fn test_parse_error() {
    let mut server = server(MockStudyService::new());
    let value = to_value(server.handle_line("{not json").await);
    assert_eq!(value["error"]["code"], PARSE_ERROR);
    assert_eq!(value["id"], Value::Null);
}

#[tokio::test]
async fn test_unknown_method() {
    let mut server = server(MockStudyService::new());
    let value = to_value(
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":"a","method":"session/rewind"}"#)
            .await,
    );
    assert_eq!(value["error"]["code"], METHOD_NOT_FOUND);
    assert_eq!(value["id"], "a");
}

#[tokio::test]
async fn test_wrong_jsonrpc_version_is_invalid_request() {
    let mut server = server(MockStudyService::new());
    let value = to_value(
        server
            .handle_line(r#"{"jsonrpc":"1.0","id":4,"method":"ping"}"#)
            .await,
    );
    assert_eq!(value["error"]["code"], INVALID_REQUEST);
    assert_eq!(value["id"], 4);
    assert!(value["error"]["message"]
        .as_str()
        .unwrap()
        .contains("unsupported jsonrpc version '1.0'"));
}

#[tokio::test]
async fn test_view_before_plan() {
    let mut server = server(MockStudyService::new());
    let value = to_value(
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"session/view"}"#)
            .await,
    );
    assert_eq!(value["result"]["participant_id"], "P09");
    assert_eq!(value["result"]["view"]["phase"], "loading_plan");
    assert_eq!(value["result"]["accepted_submissions"], 0);
}

#[tokio::test]
async fn test_missing_params_is_invalid_params() {
    let mut server = server(MockStudyService::new());
    let value = to_value(
        server
            .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"session/start_task"}"#)
            .await,
    );
    assert_eq!(value["error"]["code"], INVALID_PARAMS);
}

#[tokio::test]
async fn test_session_errors_carry_kind() {
    let mut server = server(single_block_service());
    server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"session/load_plan"}"#)
        .await;

    let value = to_value(
        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":2,"method":"session/submit_questionnaire","params":{"questionnaire_type":"trust","responses":{}}}"#,
            )
            .await,
    );
    assert_eq!(value["error"]["code"], PROTOCOL_VIOLATION);
    assert_eq!(value["error"]["data"]["kind"], "protocol_violation");
    assert_eq!(value["error"]["data"]["retryable"], false);

    let value = to_value(
        server
            .handle_line(
                r#"{"jsonrpc":"2.0","id":3,"method":"session/submit_questionnaire","params":{"questionnaire_type":"SUS","responses":{"0":9}}}"#,
            )
            .await,
    );
    assert_eq!(value["error"]["code"], INVALID_SUBMISSION);
}

#[tokio::test]
async fn test_notification_gets_no_response() {
    let mut server = server(single_block_service());
    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","method":"session/load_plan"}"#)
        .await;
    assert!(response.is_none());
    assert!(server.session().plan().is_some());
}

#[tokio::test]
async fn test_serve_line_protocol() {
    let mut server = server(single_block_service());
    let sus: serde_json::Map<String, Value> =
        (0..10).map(|i| (i.to_string(), json!(5))).collect();
    let input = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "session/load_plan"}),
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "session/submit_questionnaire",
            "params": {"questionnaire_type": "SUS", "responses": sus}
        }),
    ]
    .iter()
    .map(|v| v.to_string())
    .collect::<Vec<_>>()
    .join("\n\n");

    let mut output = Vec::new();
    server
        .serve(tokio::io::BufReader::new(input.as_bytes()), &mut output)
        .await
        .unwrap();

    let lines: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["result"]["phase"], "in_questionnaire");
    assert_eq!(lines[0]["result"]["questionnaire_type"], "SUS");
    assert_eq!(lines[1]["result"]["questionnaire_type"], "NASA_TLX");
    assert_eq!(lines[1]["result"]["questionnaire_position"]["number"], 2);
}
