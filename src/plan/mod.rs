//! Participant experiment plan.
//!
//! An [`ExperimentPlan`] is delivered once per session by the planning service
//! and never changes afterwards. It fixes the order in which a participant
//! meets the three search interfaces and the tasks attempted on each.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::PlanResponse;
use crate::error::{SessionError, SessionResult};
use crate::submission::QuestionnaireType;

/// One of the search-interaction modes under study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Filter builder over movie facets.
    Faceted,
    /// Natural-language query parsed by an LLM, previewed, then executed.
    LlmAssist,
    /// Natural-language question answered directly by an LLM.
    LlmOnly,
}

impl InterfaceKind {
    /// All interface kinds.
    pub const ALL: [InterfaceKind; 3] = [
        InterfaceKind::Faceted,
        InterfaceKind::LlmAssist,
        InterfaceKind::LlmOnly,
    ];

    /// Wire token for this interface.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Faceted => "faceted",
            InterfaceKind::LlmAssist => "llm_assist",
            InterfaceKind::LlmOnly => "llm_only",
        }
    }

    /// Human-readable name shown to participants.
    pub fn display_name(&self) -> &'static str {
        match self {
            InterfaceKind::Faceted => "Faceted Search",
            InterfaceKind::LlmAssist => "LLM-Assisted Search with Preview",
            InterfaceKind::LlmOnly => "LLM-Only Search",
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InterfaceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "faceted" => Ok(InterfaceKind::Faceted),
            "llm_assist" => Ok(InterfaceKind::LlmAssist),
            "llm_only" => Ok(InterfaceKind::LlmOnly),
            _ => Err(format!("Unknown interface kind: {}", s)),
        }
    }
}

/// A task assigned to a participant on one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, unique within its interface's task list.
    pub task_id: String,
    /// Text shown to the participant.
    pub description: String,
    /// Ordinal difficulty label such as "simple" or "complex".
    #[serde(default)]
    pub complexity: Option<String>,
}

/// Validated, immutable plan for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentPlan {
    interface_order: Vec<InterfaceKind>,
    tasks: HashMap<InterfaceKind, Vec<Task>>,
}

impl ExperimentPlan {
    /// Build a plan directly from its parts, applying the same checks as
    /// [`ExperimentPlan::from_response`].
    pub fn new(
        interface_order: Vec<InterfaceKind>,
        tasks: HashMap<InterfaceKind, Vec<Task>>,
    ) -> SessionResult<Self> {
        for kind in &interface_order {
            let list = tasks.get(kind).ok_or_else(|| SessionError::PlanUnavailable {
                message: format!("no task list for interface '{}'", kind),
            })?;

            let mut seen = HashSet::new();
            for task in list {
                if task.task_id.trim().is_empty() {
                    return Err(SessionError::PlanUnavailable {
                        message: format!("empty task_id in '{}' task list", kind),
                    });
                }
                if !seen.insert(task.task_id.as_str()) {
                    return Err(SessionError::PlanUnavailable {
                        message: format!("duplicate task_id '{}' for interface '{}'", task.task_id, kind),
                    });
                }
            }
        }

        Ok(Self {
            interface_order,
            tasks,
        })
    }

    /// Validate a plan as delivered by the planning service.
    pub fn from_response(participant_id: &str, response: PlanResponse) -> SessionResult<Self> {
        if let Some(echoed) = response.participant_id.as_deref() {
            if echoed != participant_id {
                return Err(SessionError::PlanUnavailable {
                    message: format!(
                        "plan issued for participant '{}', expected '{}'",
                        echoed, participant_id
                    ),
                });
            }
        }

        let interface_order = response
            .interface_order
            .iter()
            .map(|token| {
                token
                    .parse::<InterfaceKind>()
                    .map_err(|message| SessionError::PlanUnavailable { message })
            })
            .collect::<SessionResult<Vec<_>>>()?;

        let mut tasks = HashMap::new();
        for (key, list) in response.tasks {
            match key.parse::<InterfaceKind>() {
                Ok(kind) => {
                    tasks.insert(kind, list);
                }
                Err(_) => debug!(interface = %key, "Ignoring task list for unknown interface"),
            }
        }

        Self::new(interface_order, tasks)
    }

    /// Interfaces in the order the participant meets them.
    pub fn interface_order(&self) -> &[InterfaceKind] {
        &self.interface_order
    }

    /// Number of interface blocks in the plan.
    pub fn interface_count(&self) -> usize {
        self.interface_order.len()
    }

    /// Interface at position `index` of the order.
    pub fn interface_at(&self, index: usize) -> Option<InterfaceKind> {
        self.interface_order.get(index).copied()
    }

    /// Task list for an interface kind. Empty when the kind is not planned.
    pub fn tasks_for(&self, kind: InterfaceKind) -> &[Task] {
        self.tasks.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Task count of the interface block at `index`.
    pub fn task_count(&self, index: usize) -> usize {
        self.interface_at(index)
            .map(|kind| self.tasks_for(kind).len())
            .unwrap_or(0)
    }

    /// Task at `(interface_index, task_index)`.
    pub fn task_at(&self, interface_index: usize, task_index: usize) -> Option<&Task> {
        self.interface_at(interface_index)
            .and_then(|kind| self.tasks_for(kind).get(task_index))
    }

    /// Number of submissions needed to finish the study.
    pub fn total_prompts(&self) -> usize {
        let tasks: usize = (0..self.interface_count()).map(|i| self.task_count(i)).sum();
        tasks + self.interface_count() * QuestionnaireType::COUNT
    }
}
