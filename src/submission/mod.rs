//! Task and questionnaire submission envelopes.
//!
//! Interface and questionnaire collaborators hand these to the session. The
//! session checks their shape, attaches computed fields and forwards them to
//! the logging service. Nothing here is retained after forwarding.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{SessionError, SessionResult};
use crate::plan::InterfaceKind;

// ============================================================================
// Task submissions
// ============================================================================

/// Final answer for one task, shaped by the interface that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "interface_type", rename_all = "snake_case")]
pub enum TaskAnswer {
    /// Faceted filter builder answer.
    Faceted {
        /// Movies the participant selected as the answer.
        selected_movie_ids: Vec<i64>,
        /// Number of results shown when the answer was submitted.
        #[serde(default)]
        result_count: u32,
    },
    /// Parse, preview, execute answer.
    LlmAssist {
        /// Natural-language query as typed.
        nl_query: String,
        /// Structured query the participant confirmed in the preview.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parsed_query: Option<serde_json::Value>,
        /// Movies the participant selected as the answer.
        selected_movie_ids: Vec<i64>,
        /// Number of results shown when the answer was submitted.
        #[serde(default)]
        result_count: u32,
        /// How many times the query was rewritten.
        #[serde(default)]
        reformulations: u32,
    },
    /// Direct-answer flow.
    LlmOnly {
        /// Natural-language question as typed.
        nl_query: String,
        /// Answer text the system returned.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        /// Movies the participant selected as the answer.
        selected_movie_ids: Vec<i64>,
        /// Number of results shown when the answer was submitted.
        #[serde(default)]
        result_count: u32,
        /// How many times the question was rewritten.
        #[serde(default)]
        reformulations: u32,
    },
}

impl TaskAnswer {
    /// Interface that produced this answer.
    pub fn interface_kind(&self) -> InterfaceKind {
        match self {
            TaskAnswer::Faceted { .. } => InterfaceKind::Faceted,
            TaskAnswer::LlmAssist { .. } => InterfaceKind::LlmAssist,
            TaskAnswer::LlmOnly { .. } => InterfaceKind::LlmOnly,
        }
    }

    /// Final selection of movie identifiers.
    pub fn selected_movie_ids(&self) -> &[i64] {
        match self {
            TaskAnswer::Faceted {
                selected_movie_ids, ..
            }
            | TaskAnswer::LlmAssist {
                selected_movie_ids, ..
            }
            | TaskAnswer::LlmOnly {
                selected_movie_ids, ..
            } => selected_movie_ids,
        }
    }

    /// Check the payload shape.
    pub fn validate(&self) -> SessionResult<()> {
        let mut seen = HashSet::new();
        if let Some(dup) = self.selected_movie_ids().iter().find(|id| !seen.insert(**id)) {
            return Err(SessionError::invalid(
                "selected_movie_ids",
                format!("duplicate id {}", dup),
            ));
        }

        match self {
            TaskAnswer::LlmAssist { nl_query, .. } | TaskAnswer::LlmOnly { nl_query, .. }
                if nl_query.trim().is_empty() =>
            {
                Err(SessionError::invalid("nl_query", "cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// A completed task as handed over by an interface collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSubmission {
    /// Task the answer belongs to.
    pub task_id: String,
    /// Interface-specific payload.
    pub answer: TaskAnswer,
}

impl TaskSubmission {
    /// Create a submission for a task.
    pub fn new(task_id: impl Into<String>, answer: TaskAnswer) -> Self {
        Self {
            task_id: task_id.into(),
            answer,
        }
    }
}

/// Task-end payload sent to the logging service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskEndPayload {
    #[serde(flatten)]
    pub answer: TaskAnswer,
    /// Milliseconds between task start and submission, null if the start was
    /// never recorded.
    pub task_duration_ms: Option<u64>,
}

impl TaskEndPayload {
    /// Attach the computed duration to an answer.
    pub fn finalize(
        answer: TaskAnswer,
        started_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let task_duration_ms = started_at.map(|start| {
            let elapsed = (ended_at - start).num_milliseconds();
            if elapsed < 0 {
                warn!(
                    elapsed_ms = elapsed,
                    "Task end precedes task start, clamping duration to zero"
                );
                0
            } else {
                elapsed as u64
            }
        });

        Self {
            answer,
            task_duration_ms,
        }
    }
}

// ============================================================================
// Questionnaires
// ============================================================================

/// Questionnaire administered after each interface block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionnaireType {
    /// System Usability Scale.
    #[serde(rename = "SUS")]
    Sus,
    /// NASA Task Load Index.
    #[serde(rename = "NASA_TLX")]
    NasaTlx,
    /// Trust in automation items.
    #[serde(rename = "trust")]
    Trust,
    /// Interface preference ratings.
    #[serde(rename = "preference")]
    Preference,
}

impl QuestionnaireType {
    /// Fixed administration order.
    pub const SEQUENCE: [QuestionnaireType; 4] = [
        QuestionnaireType::Sus,
        QuestionnaireType::NasaTlx,
        QuestionnaireType::Trust,
        QuestionnaireType::Preference,
    ];

    /// Questionnaires per interface block.
    pub const COUNT: usize = Self::SEQUENCE.len();

    /// Questionnaire at position `index` of the sequence.
    pub fn at(index: usize) -> Option<QuestionnaireType> {
        Self::SEQUENCE.get(index).copied()
    }

    /// Wire token.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionnaireType::Sus => "SUS",
            QuestionnaireType::NasaTlx => "NASA_TLX",
            QuestionnaireType::Trust => "trust",
            QuestionnaireType::Preference => "preference",
        }
    }

    fn items(&self) -> &'static [ItemSpec] {
        match self {
            QuestionnaireType::Sus => SUS_ITEMS,
            QuestionnaireType::NasaTlx => NASA_TLX_ITEMS,
            QuestionnaireType::Trust => TRUST_ITEMS,
            QuestionnaireType::Preference => PREFERENCE_ITEMS,
        }
    }
}

impl std::fmt::Display for QuestionnaireType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QuestionnaireType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUS" => Ok(QuestionnaireType::Sus),
            "NASA_TLX" => Ok(QuestionnaireType::NasaTlx),
            "trust" => Ok(QuestionnaireType::Trust),
            "preference" => Ok(QuestionnaireType::Preference),
            _ => Err(format!("Unknown questionnaire type: {}", s)),
        }
    }
}

/// A single questionnaire answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    /// Ordinal rating.
    Scale(i64),
    /// Free text, or a rating the form sent as text.
    Text(String),
}

impl ResponseValue {
    fn as_rating(&self) -> Option<i64> {
        match self {
            ResponseValue::Scale(v) => Some(*v),
            ResponseValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Responses to one questionnaire for the current interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionnaireSubmission {
    pub questionnaire_type: QuestionnaireType,
    pub responses: BTreeMap<String, ResponseValue>,
}

impl QuestionnaireSubmission {
    /// Create a submission.
    pub fn new(
        questionnaire_type: QuestionnaireType,
        responses: BTreeMap<String, ResponseValue>,
    ) -> Self {
        Self {
            questionnaire_type,
            responses,
        }
    }

    /// Check every item against the questionnaire's item set.
    pub fn validate(&self) -> SessionResult<()> {
        let items = self.questionnaire_type.items();

        if let Some(key) = self
            .responses
            .keys()
            .find(|key| !items.iter().any(|item| item.key == key.as_str()))
        {
            return Err(SessionError::invalid(
                format!("responses.{}", key),
                format!("not an item of {}", self.questionnaire_type),
            ));
        }

        for item in items {
            let field = format!("responses.{}", item.key);
            match (item.rule, self.responses.get(item.key)) {
                (ItemRule::Rating { min, max }, Some(value)) => {
                    let rating = value
                        .as_rating()
                        .ok_or_else(|| SessionError::invalid(&field, "expected a rating"))?;
                    if rating < min || rating > max {
                        return Err(SessionError::invalid(
                            &field,
                            format!("rating {} outside {}..={}", rating, min, max),
                        ));
                    }
                }
                (ItemRule::Rating { .. }, None) => {
                    return Err(SessionError::invalid(&field, "answer required"));
                }
                (ItemRule::OptionalText, Some(ResponseValue::Scale(_))) => {
                    return Err(SessionError::invalid(&field, "expected text"));
                }
                (ItemRule::OptionalText, _) => {}
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum ItemRule {
    Rating { min: i64, max: i64 },
    OptionalText,
}

#[derive(Debug)]
struct ItemSpec {
    key: &'static str,
    rule: ItemRule,
}

const fn rating(key: &'static str, min: i64, max: i64) -> ItemSpec {
    ItemSpec {
        key,
        rule: ItemRule::Rating { min, max },
    }
}

// SUS items are keyed by their 0-based position on the form.
const SUS_ITEMS: &[ItemSpec] = &[
    rating("0", 1, 5),
    rating("1", 1, 5),
    rating("2", 1, 5),
    rating("3", 1, 5),
    rating("4", 1, 5),
    rating("5", 1, 5),
    rating("6", 1, 5),
    rating("7", 1, 5),
    rating("8", 1, 5),
    rating("9", 1, 5),
];

const NASA_TLX_ITEMS: &[ItemSpec] = &[
    rating("mental_demand", 0, 100),
    rating("physical_demand", 0, 100),
    rating("temporal_demand", 0, 100),
    rating("performance", 0, 100),
    rating("effort", 0, 100),
    rating("frustration", 0, 100),
];

const TRUST_ITEMS: &[ItemSpec] = &[
    rating("trust_accuracy", 1, 7),
    rating("trust_transparency", 1, 7),
    rating("trust_control", 1, 7),
    rating("trust_reliability", 1, 7),
    rating("trust_predictability", 1, 7),
];

const PREFERENCE_ITEMS: &[ItemSpec] = &[
    rating("ease_of_use", 1, 7),
    rating("efficiency", 1, 7),
    rating("satisfaction", 1, 7),
    ItemSpec {
        key: "preference_ranking",
        rule: ItemRule::OptionalText,
    },
];
