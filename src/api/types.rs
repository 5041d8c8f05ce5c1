use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::plan::{InterfaceKind, Task};
use crate::submission::{QuestionnaireType, ResponseValue, TaskEndPayload};

/// Plan as returned by `GET /experiment/plan`.
///
/// Interface tokens are kept as raw strings here and checked when the
/// response is turned into an [`ExperimentPlan`](crate::plan::ExperimentPlan).
#[derive(Debug, Clone, Deserialize)]
pub struct PlanResponse {
    #[serde(default)]
    pub participant_id: Option<String>,
    pub interface_order: Vec<String>,
    pub tasks: HashMap<String, Vec<Task>>,
    #[serde(default)]
    pub consent_given: Option<bool>,
}

/// Body of `POST /log/task/start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStartRequest {
    pub participant_id: String,
    pub interface_type: InterfaceKind,
    pub task_id: String,
}

/// Body of `POST /log/task/end`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEndRequest {
    pub participant_id: String,
    pub interface_type: InterfaceKind,
    pub task_id: String,
    pub submission: TaskEndPayload,
}

/// Body of `POST /questionnaire`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionnaireRequest {
    pub participant_id: String,
    pub interface_type: InterfaceKind,
    pub questionnaire_type: QuestionnaireType,
    pub responses: BTreeMap<String, ResponseValue>,
}

/// Acknowledgment of a logged task event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LogAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub log_id: Option<i64>,
}

/// Acknowledgment of a stored questionnaire.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuestionnaireAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub questionnaire_id: Option<i64>,
}

/// Body of the participant intake endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantRequest {
    pub participant_id: String,
}

/// Participant record returned by intake endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantRecord {
    pub participant_id: String,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub interface_order: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::TaskAnswer;
    use serde_json::json;

    #[test]
    fn test_plan_response_tolerates_extra_fields() {
        let response: PlanResponse = serde_json::from_value(json!({
            "participant_id": "P07",
            "interface_order": ["llm_only", "faceted", "llm_assist"],
            "tasks": {
                "llm_only": [{
                    "id": 3,
                    "task_id": "LO1",
                    "description": "Name a thriller over two hours",
                    "complexity": "complex",
                    "ground_truth": [12, 40],
                    "interface_type": "llm_only"
                }]
            },
            "consent_given": true
        }))
        .unwrap();

        assert_eq!(response.interface_order.len(), 3);
        assert_eq!(response.tasks["llm_only"][0].task_id, "LO1");
        assert_eq!(response.consent_given, Some(true));
    }

    #[test]
    fn test_task_end_request_wire_shape() {
        let request = TaskEndRequest {
            participant_id: "P07".to_string(),
            interface_type: InterfaceKind::LlmOnly,
            task_id: "LO1".to_string(),
            submission: TaskEndPayload {
                answer: TaskAnswer::LlmOnly {
                    nl_query: "long thrillers".to_string(),
                    answer: Some("Heat (1995)".to_string()),
                    selected_movie_ids: vec![12],
                    result_count: 5,
                    reformulations: 2,
                },
                task_duration_ms: Some(61000),
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["interface_type"], "llm_only");
        assert_eq!(value["submission"]["nl_query"], "long thrillers");
        assert_eq!(value["submission"]["reformulations"], 2);
        assert_eq!(value["submission"]["task_duration_ms"], 61000);
    }

    #[test]
    fn test_questionnaire_request_wire_shape() {
        let mut responses = BTreeMap::new();
        responses.insert("trust_accuracy".to_string(), ResponseValue::Scale(6));
        let request = QuestionnaireRequest {
            participant_id: "P07".to_string(),
            interface_type: InterfaceKind::Faceted,
            questionnaire_type: QuestionnaireType::Trust,
            responses,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "participant_id": "P07",
                "interface_type": "faceted",
                "questionnaire_type": "trust",
                "responses": {"trust_accuracy": 6}
            })
        );
    }
}
