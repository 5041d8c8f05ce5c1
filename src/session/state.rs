use serde::Serialize;

use crate::plan::{ExperimentPlan, InterfaceKind, Task};
use crate::submission::QuestionnaireType;

/// Where a session currently is in the protocol.
///
/// Indices live inside the variants that use them, so a questionnaire index
/// can never coexist with a task index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the plan.
    LoadingPlan,
    /// Working on task `task_index` of interface block `interface_index`.
    InTask {
        interface_index: usize,
        task_index: usize,
    },
    /// Answering questionnaire `questionnaire_index` for interface block
    /// `interface_index`.
    InQuestionnaire {
        interface_index: usize,
        questionnaire_index: usize,
    },
    /// Every interface block and questionnaire is done.
    Completed,
    /// The plan could not be loaded or a forward was rejected for good.
    Failed,
}

/// Index-free phase tag, for rendering and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    LoadingPlan,
    InTask,
    InQuestionnaire,
    Completed,
    Failed,
}

impl PhaseKind {
    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::LoadingPlan => "loading_plan",
            PhaseKind::InTask => "in_task",
            PhaseKind::InQuestionnaire => "in_questionnaire",
            PhaseKind::Completed => "completed",
            PhaseKind::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Phase {
    /// Phase tag without indices.
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::LoadingPlan => PhaseKind::LoadingPlan,
            Phase::InTask { .. } => PhaseKind::InTask,
            Phase::InQuestionnaire { .. } => PhaseKind::InQuestionnaire,
            Phase::Completed => PhaseKind::Completed,
            Phase::Failed => PhaseKind::Failed,
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }
}

/// Session position. Only [`ExperimentSession`](super::ExperimentSession)
/// mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    phase: Phase,
    completed_interfaces: Vec<InterfaceKind>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::LoadingPlan,
            completed_interfaces: Vec::new(),
        }
    }
}

impl SessionState {
    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Interfaces whose task phase has finished, in order.
    pub fn completed_interfaces(&self) -> &[InterfaceKind] {
        &self.completed_interfaces
    }

    /// Position in the interface order while a block is active.
    pub fn interface_index(&self) -> Option<usize> {
        match self.phase {
            Phase::InTask {
                interface_index, ..
            }
            | Phase::InQuestionnaire {
                interface_index, ..
            } => Some(interface_index),
            _ => None,
        }
    }

    /// Task position while in a task.
    pub fn task_index(&self) -> Option<usize> {
        match self.phase {
            Phase::InTask { task_index, .. } => Some(task_index),
            _ => None,
        }
    }

    /// Questionnaire position while in the questionnaire battery.
    pub fn questionnaire_index(&self) -> Option<usize> {
        match self.phase {
            Phase::InQuestionnaire {
                questionnaire_index,
                ..
            } => Some(questionnaire_index),
            _ => None,
        }
    }

    pub(crate) fn fail(&mut self) {
        self.phase = Phase::Failed;
    }

    /// Leave `LoadingPlan` for the first prompt of the plan.
    pub(crate) fn begin(&mut self, plan: &ExperimentPlan) {
        self.completed_interfaces.clear();
        self.enter_interface(plan, 0);
    }

    /// Move past the task at the current position.
    pub(crate) fn advance_after_task(&mut self, plan: &ExperimentPlan) {
        let Phase::InTask {
            interface_index,
            task_index,
        } = self.phase
        else {
            return;
        };

        if task_index + 1 < plan.task_count(interface_index) {
            self.phase = Phase::InTask {
                interface_index,
                task_index: task_index + 1,
            };
        } else {
            self.finish_tasks(plan, interface_index);
        }
    }

    /// Move past the questionnaire at the current position.
    pub(crate) fn advance_after_questionnaire(&mut self, plan: &ExperimentPlan) {
        let Phase::InQuestionnaire {
            interface_index,
            questionnaire_index,
        } = self.phase
        else {
            return;
        };

        if questionnaire_index + 1 < QuestionnaireType::COUNT {
            self.phase = Phase::InQuestionnaire {
                interface_index,
                questionnaire_index: questionnaire_index + 1,
            };
        } else {
            self.enter_interface(plan, interface_index + 1);
        }
    }

    fn enter_interface(&mut self, plan: &ExperimentPlan, interface_index: usize) {
        if interface_index >= plan.interface_count() {
            self.phase = Phase::Completed;
        } else if plan.task_count(interface_index) > 0 {
            self.phase = Phase::InTask {
                interface_index,
                task_index: 0,
            };
        } else {
            self.finish_tasks(plan, interface_index);
        }
    }

    fn finish_tasks(&mut self, plan: &ExperimentPlan, interface_index: usize) {
        if let Some(kind) = plan.interface_at(interface_index) {
            self.completed_interfaces.push(kind);
        }
        self.phase = Phase::InQuestionnaire {
            interface_index,
            questionnaire_index: 0,
        };
    }
}

/// 1-based step within a block, for "Task 2 of 3" style progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepPosition {
    pub number: usize,
    pub total: usize,
}

/// Read-only projection the interface and questionnaire collaborators render
/// from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentView {
    pub phase: PhaseKind,
    pub interface_kind: Option<InterfaceKind>,
    pub interface_name: Option<String>,
    pub task: Option<Task>,
    pub task_position: Option<StepPosition>,
    /// Whether the start of the task in scope has been recorded.
    pub task_started: bool,
    pub questionnaire_type: Option<QuestionnaireType>,
    pub questionnaire_position: Option<StepPosition>,
    pub interface_index_in_order: usize,
    pub total_interfaces: usize,
    pub completed_interfaces: Vec<InterfaceKind>,
}

impl CurrentView {
    pub(crate) fn project(
        state: &SessionState,
        plan: Option<&ExperimentPlan>,
        task_started: bool,
    ) -> Self {
        let total_interfaces = plan.map(ExperimentPlan::interface_count).unwrap_or(0);
        let interface_kind = state
            .interface_index()
            .and_then(|i| plan.and_then(|p| p.interface_at(i)));

        let (task, task_position) = match (state.phase, plan) {
            (
                Phase::InTask {
                    interface_index,
                    task_index,
                },
                Some(plan),
            ) => (
                plan.task_at(interface_index, task_index).cloned(),
                Some(StepPosition {
                    number: task_index + 1,
                    total: plan.task_count(interface_index),
                }),
            ),
            _ => (None, None),
        };

        let (questionnaire_type, questionnaire_position) = match state.phase {
            Phase::InQuestionnaire {
                questionnaire_index,
                ..
            } => (
                QuestionnaireType::at(questionnaire_index),
                Some(StepPosition {
                    number: questionnaire_index + 1,
                    total: QuestionnaireType::COUNT,
                }),
            ),
            _ => (None, None),
        };

        let interface_index_in_order = match state.phase {
            Phase::LoadingPlan => 0,
            Phase::InTask {
                interface_index, ..
            }
            | Phase::InQuestionnaire {
                interface_index, ..
            } => interface_index,
            Phase::Completed => total_interfaces,
            Phase::Failed => state.completed_interfaces.len().min(total_interfaces),
        };

        Self {
            phase: state.phase.kind(),
            interface_kind,
            interface_name: interface_kind.map(|k| k.display_name().to_string()),
            task,
            task_position,
            task_started: task_started && matches!(state.phase, Phase::InTask { .. }),
            questionnaire_type,
            questionnaire_position,
            interface_index_in_order,
            total_interfaces,
            completed_interfaces: state.completed_interfaces.clone(),
        }
    }
}
